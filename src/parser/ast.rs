// Parse-tree and typed AST definitions for the SSI front end

use std::fmt;
use std::ops::Range;
use std::rc::Rc;

/// Source location information for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Byte range of a token in the original source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`
    pub fn cover(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Node of a hole-aware parse tree.
///
/// Nodes never own tokens: every variant refers to positions in the token
/// slice that was parsed, so a rewrite can splice the slice by range.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseNode {
    /// A single token
    Terminal(usize),
    /// Ordered children produced by sequencing/repetition
    Sequence {
        range: Range<usize>,
        children: Vec<ParseNode>,
    },
    /// A named construct (`If`, `While`, `Binary`, ...)
    Form {
        name: &'static str,
        range: Range<usize>,
        children: Vec<ParseNode>,
    },
    /// A balanced but otherwise unparsed token run. `delimited` holes include
    /// their opening and closing tokens in `range`.
    Hole { range: Range<usize>, delimited: bool },
}

impl ParseNode {
    pub fn range(&self) -> Range<usize> {
        match self {
            ParseNode::Terminal(i) => *i..*i + 1,
            ParseNode::Sequence { range, .. }
            | ParseNode::Form { range, .. }
            | ParseNode::Hole { range, .. } => range.clone(),
        }
    }

    /// Construct name for `Form` nodes
    pub fn name(&self) -> Option<&'static str> {
        match self {
            ParseNode::Form { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_form(&self, wanted: &str) -> bool {
        self.name() == Some(wanted)
    }

    pub fn children(&self) -> &[ParseNode] {
        match self {
            ParseNode::Sequence { children, .. } | ParseNode::Form { children, .. } => children,
            _ => &[],
        }
    }

    /// Token range of a hole without its delimiters
    pub fn inner(&self) -> Range<usize> {
        match self {
            ParseNode::Hole {
                range,
                delimited: true,
            } => range.start + 1..range.end.saturating_sub(1).max(range.start + 1),
            other => other.range(),
        }
    }

    /// Offset every position in the tree, used after parsing a sub-slice
    pub fn shift(&mut self, offset: usize) {
        match self {
            ParseNode::Terminal(i) => *i += offset,
            ParseNode::Hole { range, .. } => *range = range.start + offset..range.end + offset,
            ParseNode::Sequence { range, children } | ParseNode::Form { range, children, .. } => {
                *range = range.start + offset..range.end + offset;
                for child in children {
                    child.shift(offset);
                }
            }
        }
    }

    /// First node in pre-order (outermost first) satisfying `pred`
    pub fn find(&self, pred: &dyn Fn(&ParseNode) -> bool) -> Option<&ParseNode> {
        if pred(self) {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.find(pred))
    }

    /// Strip redundant `Paren` wrappers
    pub fn unparenthesized(&self) -> &ParseNode {
        let mut node = self;
        while node.is_form("Paren") {
            match node.children().get(1) {
                Some(inner) => node = inner,
                None => break,
            }
        }
        node
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    BitShl,
    BitShr,
}

impl BinOp {
    pub const ALL: [BinOp; 18] = [
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::Div,
        BinOp::Mod,
        BinOp::Eq,
        BinOp::Ne,
        BinOp::Lt,
        BinOp::Le,
        BinOp::Gt,
        BinOp::Ge,
        BinOp::And,
        BinOp::Or,
        BinOp::BitAnd,
        BinOp::BitOr,
        BinOp::BitXor,
        BinOp::BitShl,
        BinOp::BitShr,
    ];

    pub fn from_symbol(symbol: &str) -> Option<BinOp> {
        BinOp::ALL.into_iter().find(|op| op.symbol() == symbol)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::BitShl => "<<",
            BinOp::BitShr => ">>",
        }
    }

    pub fn is_short_circuit(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Neg,     // -x
    Plus,    // +x
    Not,     // !x
    BitNot,  // ~x
    PreInc,  // ++x
    PreDec,  // --x
    PostInc, // x++
    PostDec, // x--
    Deref,   // *x
    AddrOf,  // &x
}

impl UnOp {
    pub fn prefix(symbol: &str) -> Option<UnOp> {
        Some(match symbol {
            "-" => UnOp::Neg,
            "+" => UnOp::Plus,
            "!" => UnOp::Not,
            "~" => UnOp::BitNot,
            "++" => UnOp::PreInc,
            "--" => UnOp::PreDec,
            "*" => UnOp::Deref,
            "&" => UnOp::AddrOf,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Plus => "+",
            UnOp::Not => "!",
            UnOp::BitNot => "~",
            UnOp::PreInc | UnOp::PostInc => "++",
            UnOp::PreDec | UnOp::PostDec => "--",
            UnOp::Deref => "*",
            UnOp::AddrOf => "&",
        }
    }
}

/// Typed expression. `text` is the space-joined source of the expression and
/// becomes the explanation text of every value it produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub text: Rc<str>,
    pub line: usize,
    /// Byte range of the expression in the text it was lexed from, when
    /// every token of it comes from that text in order
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Str(Rc<str>),
    Ident(Rc<str>),
    /// A literal the value model cannot represent (floating point)
    Unrepresentable,
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    CompoundAssign {
        op: BinOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Member {
        base: Box<Expr>,
        field: Rc<str>,
    },
    PointerMember {
        base: Box<Expr>,
        field: Rc<str>,
    },
    /// The target type is kept as a hole; casts are value-preserving
    Cast(Box<Expr>),
    Sizeof,
    Comma(Vec<Expr>),
    InitList(Vec<InitItem>),
}

impl Expr {
    /// Whether the expression denotes a memory location
    pub fn is_place(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Ident(_)
                | ExprKind::Index { .. }
                | ExprKind::Member { .. }
                | ExprKind::PointerMember { .. }
                | ExprKind::Unary {
                    op: UnOp::Deref,
                    ..
                }
        )
    }

    /// Whether any `&&`, `||` or `?:` occurs in the expression
    pub fn has_short_circuit(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            found |= matches!(
                e.kind,
                ExprKind::Ternary { .. }
                    | ExprKind::Binary {
                        op: BinOp::And | BinOp::Or,
                        ..
                    }
            )
        });
        found
    }

    pub fn walk(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        match &self.kind {
            ExprKind::Binary { lhs, rhs, .. } => {
                lhs.walk(f);
                rhs.walk(f);
            }
            ExprKind::Unary { operand, .. } | ExprKind::Cast(operand) => operand.walk(f),
            ExprKind::Assign { target, value } | ExprKind::CompoundAssign { target, value, .. } => {
                target.walk(f);
                value.walk(f);
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                cond.walk(f);
                then_expr.walk(f);
                else_expr.walk(f);
            }
            ExprKind::Call { callee, args } => {
                callee.walk(f);
                args.iter().for_each(|a| a.walk(f));
            }
            ExprKind::Index { base, index } => {
                base.walk(f);
                index.walk(f);
            }
            ExprKind::Member { base, .. } | ExprKind::PointerMember { base, .. } => base.walk(f),
            ExprKind::Comma(items) => items.iter().for_each(|e| e.walk(f)),
            ExprKind::InitList(items) => items.iter().for_each(|item| {
                for d in &item.designators {
                    if let Designator::Index(e) = d {
                        e.walk(f);
                    }
                }
                item.value.walk(f);
            }),
            _ => {}
        }
    }
}

/// Designator inside an initializer list
#[derive(Debug, Clone, PartialEq)]
pub enum Designator {
    Field(Rc<str>),
    Index(Expr),
}

/// One element of an initializer list
#[derive(Debug, Clone, PartialEq)]
pub struct InitItem {
    pub designators: Vec<Designator>,
    pub value: Expr,
}

/// Enum constant introduced by a declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Enumerator {
    pub name: Rc<str>,
    pub value: Option<Expr>,
    pub line: usize,
}

/// A single declared name
#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub name: Rc<str>,
    pub is_array: bool,
    /// Prototype (`int f(int);`), declares nothing executable
    pub is_function: bool,
    pub init: Option<Expr>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Declaration {
    pub enumerators: Vec<Enumerator>,
    pub declarators: Vec<Declarator>,
}

/// Content of a `;`-terminated line after parsing with the expression grammar
#[derive(Debug, Clone, PartialEq)]
pub enum SimpleStatement {
    Empty,
    /// `typedef`, bare struct bodies and the like
    TypeOnly,
    Declaration(Declaration),
    Expression(Expr),
}
