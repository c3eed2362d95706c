//! Expression grammar and expression tree construction
//!
//! The grammar follows C precedence: comma, assignment, conditional, the
//! binary operators (via precedence climbing), casts and prefix operators,
//! postfix chains, primaries. Call arguments that are not expressions at all
//! (`offsetof(struct s, f)`, macro arguments naming types) are accepted as
//! raw balanced token runs and evaluate to opaque values.
//!
//! All tree-building methods are implemented as `pub(crate)` methods on the
//! [`Parser`] struct.

use super::ast::*;
use super::lexer::{join_text, parse_integer, unescape, Token, TokenKind};
use super::parse::Parser;
use super::peg::*;
use std::rc::Rc;

pub(crate) const ASSIGN_OPS: &[&str] = &[
    "=", "*=", "/=", "%=", "+=", "-=", "<<=", ">>=", "&=", "^=", "|=",
];

const BINARY_TIERS: &[&[&str]] = &[
    &["||"],
    &["&&"],
    &["|"],
    &["^"],
    &["&"],
    &["==", "!="],
    &["<", "<=", ">", ">="],
    &["<<", ">>"],
    &["+", "-"],
    &["*", "/", "%"],
];

const PREFIX_OPS: &[&str] = &["++", "--", "+", "-", "!", "~", "*", "&"];

const TYPE_WORDS: &[&str] = &[
    "void", "char", "short", "int", "long", "float", "double", "signed", "unsigned", "const",
    "volatile", "struct", "union", "enum", "_Bool", "bool", "u8", "u16", "u32", "u64", "s8",
    "s16", "s32", "s64", "i8", "i16", "i32", "i64",
];

/// Whether a parenthesized token run names a type, as in a cast
pub fn looks_like_type(tokens: &[Token]) -> bool {
    let inner = match tokens {
        [open, inner @ .., close] if open.is("(") && close.is(")") => inner,
        _ => return false,
    };
    let Some(first) = inner.first() else {
        return false;
    };
    if TYPE_WORDS.contains(&&*first.text) || (first.kind == TokenKind::Ident && first.text.ends_with("_t")) {
        return true;
    }
    inner.len() > 1
        && inner.last().is_some_and(|t| t.is("*"))
        && inner.iter().all(|t| t.kind == TokenKind::Ident || t.is("*"))
}

/// Rules shared by expression statements and declarations
pub(crate) fn define_expression_rules(grammar: &mut Grammar) {
    grammar
        .define(
            "Expr",
            choice([
                form(
                    "Comma",
                    sequence([rule("Assign"), repeat1(sequence([lit(","), rule("Assign")]))]),
                ),
                rule("Assign"),
            ]),
        )
        .define(
            "Assign",
            choice([
                form(
                    "Assign",
                    sequence([rule("Unary"), one_of(ASSIGN_OPS), rule("Assign")]),
                ),
                rule("Ternary"),
            ]),
        )
        .define(
            "Ternary",
            choice([
                form(
                    "Ternary",
                    sequence([
                        rule("Binary"),
                        lit("?"),
                        rule("Expr"),
                        lit(":"),
                        rule("Ternary"),
                    ]),
                ),
                rule("Binary"),
            ]),
        )
        .define("Binary", climb(rule("Unary"), BINARY_TIERS))
        .define(
            "Unary",
            choice([
                form("Prefix", sequence([one_of(PREFIX_OPS), rule("Unary")])),
                form(
                    "Sizeof",
                    sequence([
                        lit("sizeof"),
                        choice([balanced("(", ")"), rule("Unary")]),
                    ]),
                ),
                form(
                    "Cast",
                    choice([
                        sequence([check(balanced("(", ")"), looks_like_type), rule("Unary")]),
                        sequence([
                            balanced("(", ")"),
                            ahead(choice([
                                kind(TokenKind::Ident),
                                kind(TokenKind::Number),
                                kind(TokenKind::Str),
                                kind(TokenKind::Char),
                            ])),
                            rule("Unary"),
                        ]),
                    ]),
                ),
                rule("Postfix"),
            ]),
        )
        .define(
            "Postfix",
            choice([
                form("Postfix", sequence([rule("Primary"), repeat1(rule("Suffix"))])),
                rule("Primary"),
            ]),
        )
        .define(
            "Suffix",
            choice([
                form("Index", sequence([lit("["), rule("Expr"), lit("]")])),
                form(
                    "Call",
                    sequence([
                        lit("("),
                        optional(sequence([
                            rule("Argument"),
                            repeat(sequence([lit(","), rule("Argument")])),
                        ])),
                        lit(")"),
                    ]),
                ),
                form("Member", sequence([lit("."), kind(TokenKind::Ident)])),
                form("Arrow", sequence([lit("->"), kind(TokenKind::Ident)])),
                form("PostInc", lit("++")),
                form("PostDec", lit("--")),
            ]),
        )
        .define(
            "Argument",
            choice([
                sequence([rule("Assign"), ahead(one_of(&[",", ")"]))]),
                form(
                    "RawArgument",
                    repeat1(choice([
                        balanced("(", ")"),
                        balanced("[", "]"),
                        balanced("{", "}"),
                        sequence([not(one_of(&[",", ")", "]", "}"])), any()]),
                    ])),
                ),
            ]),
        )
        .define(
            "Primary",
            choice([
                form("Paren", sequence([lit("("), rule("Expr"), lit(")")])),
                form("Strings", repeat1(kind(TokenKind::Str))),
                kind(TokenKind::Number),
                kind(TokenKind::Char),
                kind(TokenKind::Ident),
                form(
                    "InitList",
                    sequence([
                        lit("{"),
                        optional(sequence([
                            rule("InitItem"),
                            repeat(sequence([lit(","), rule("InitItem")])),
                            optional(lit(",")),
                        ])),
                        lit("}"),
                    ]),
                ),
            ]),
        )
        .define(
            "InitItem",
            choice([
                form(
                    "Designated",
                    sequence([
                        repeat1(choice([
                            form("FieldDesignator", sequence([lit("."), kind(TokenKind::Ident)])),
                            form("IndexDesignator", sequence([lit("["), rule("Ternary"), lit("]")])),
                        ])),
                        lit("="),
                        rule("Assign"),
                    ]),
                ),
                rule("Assign"),
            ]),
        );
}

/// Children that are not bare punctuation (commas, brackets)
fn operands<'n>(node: &'n ParseNode, tokens: &[Token]) -> impl Iterator<Item = &'n ParseNode> + 'n {
    let punct: Vec<bool> = node
        .children()
        .iter()
        .map(|child| match child {
            ParseNode::Terminal(i) => tokens[*i].kind == TokenKind::Punct,
            _ => false,
        })
        .collect();
    node.children()
        .iter()
        .zip(punct)
        .filter(|(_, is_punct)| !is_punct)
        .map(|(child, _)| child)
}

fn literal_body(text: &str) -> &str {
    if text.len() >= 2 {
        &text[1..text.len() - 1]
    } else {
        ""
    }
}

fn source_span(tokens: &[Token]) -> Option<Span> {
    let (first, last) = (tokens.first()?, tokens.last()?);
    let original = tokens.iter().all(|t| !t.synthetic) && tokens.windows(2).all(|w| w[0].span.end <= w[1].span.start);
    original.then(|| first.span.cover(last.span))
}

impl Parser {
    fn malformed(&self, node: &ParseNode, tokens: &[Token]) -> ParseError {
        let start = node.range().start.min(tokens.len().saturating_sub(1));
        ParseError {
            location: tokens.get(start).map(|t| t.location).unwrap_or_default(),
            found: join_text(&tokens[node.range()]),
            expected: vec![format!("well-formed {}", node.name().unwrap_or("expression"))],
            attempted: Vec::new(),
        }
    }

    fn expr_at(&self, kind: ExprKind, node: &ParseNode, tokens: &[Token]) -> Expr {
        let range = node.range();
        Expr {
            kind,
            text: join_text(&tokens[range.clone()]).into(),
            line: tokens.get(range.start).map(|t| t.line()).unwrap_or(0),
            span: source_span(&tokens[range]),
        }
    }

    fn child<'n>(
        &self,
        node: &'n ParseNode,
        index: usize,
        tokens: &[Token],
    ) -> Result<&'n ParseNode, ParseError> {
        node.children()
            .get(index)
            .ok_or_else(|| self.malformed(node, tokens))
    }

    fn terminal_text<'t>(&self, node: &ParseNode, tokens: &'t [Token]) -> Result<&'t Rc<str>, ParseError> {
        match node {
            ParseNode::Terminal(i) => Ok(&tokens[*i].text),
            _ => Err(self.malformed(node, tokens)),
        }
    }

    /// Convert an expression parse tree into a typed [`Expr`]
    pub(crate) fn build_expr(&self, node: &ParseNode, tokens: &[Token]) -> Result<Expr, ParseError> {
        let boxed = |parser: &Parser, n: &ParseNode| parser.build_expr(n, tokens).map(Box::new);
        let kind = match node {
            ParseNode::Terminal(i) => {
                let token = &tokens[*i];
                match token.kind {
                    TokenKind::Number => match parse_integer(&token.text) {
                        Some(value) => ExprKind::Int(value),
                        None => ExprKind::Unrepresentable,
                    },
                    TokenKind::Char => {
                        let decoded = unescape(literal_body(&token.text));
                        ExprKind::Int(decoded.chars().next().map(|c| c as i64).unwrap_or(0))
                    }
                    TokenKind::Str => ExprKind::Str(unescape(literal_body(&token.text)).into()),
                    TokenKind::Ident => ExprKind::Ident(token.text.clone()),
                    _ => return Err(self.malformed(node, tokens)),
                }
            }
            ParseNode::Form { name, children, .. } => match *name {
                "Paren" => return self.build_expr(self.child(node, 1, tokens)?, tokens),
                "Strings" => {
                    let mut joined = String::new();
                    for child in children {
                        joined.push_str(&unescape(literal_body(self.terminal_text(child, tokens)?)));
                    }
                    ExprKind::Str(joined.into())
                }
                "Comma" => ExprKind::Comma(
                    operands(node, tokens)
                        .map(|n| self.build_expr(n, tokens))
                        .collect::<Result<_, _>>()?,
                ),
                "Assign" => {
                    let op = self.terminal_text(self.child(node, 1, tokens)?, tokens)?;
                    let target = boxed(self, self.child(node, 0, tokens)?)?;
                    let value = boxed(self, self.child(node, 2, tokens)?)?;
                    match op.strip_suffix('=').filter(|s| !s.is_empty()) {
                        None => ExprKind::Assign { target, value },
                        Some(symbol) => ExprKind::CompoundAssign {
                            op: BinOp::from_symbol(symbol).ok_or_else(|| self.malformed(node, tokens))?,
                            target,
                            value,
                        },
                    }
                }
                "Ternary" => ExprKind::Ternary {
                    cond: boxed(self, self.child(node, 0, tokens)?)?,
                    then_expr: boxed(self, self.child(node, 2, tokens)?)?,
                    else_expr: boxed(self, self.child(node, 4, tokens)?)?,
                },
                "Binary" => {
                    let symbol = self.terminal_text(self.child(node, 1, tokens)?, tokens)?;
                    ExprKind::Binary {
                        op: BinOp::from_symbol(symbol).ok_or_else(|| self.malformed(node, tokens))?,
                        lhs: boxed(self, self.child(node, 0, tokens)?)?,
                        rhs: boxed(self, self.child(node, 2, tokens)?)?,
                    }
                }
                "Prefix" => {
                    let symbol = self.terminal_text(self.child(node, 0, tokens)?, tokens)?;
                    ExprKind::Unary {
                        op: UnOp::prefix(symbol).ok_or_else(|| self.malformed(node, tokens))?,
                        operand: boxed(self, self.child(node, 1, tokens)?)?,
                    }
                }
                "Sizeof" => ExprKind::Sizeof,
                "Cast" => {
                    let operand = children.last().ok_or_else(|| self.malformed(node, tokens))?;
                    ExprKind::Cast(boxed(self, operand)?)
                }
                "Postfix" => return self.build_postfix(node, tokens),
                "RawArgument" => ExprKind::Unrepresentable,
                "InitList" => {
                    let mut items = Vec::new();
                    for item in operands(node, tokens) {
                        items.push(self.build_init_item(item, tokens)?);
                    }
                    ExprKind::InitList(items)
                }
                _ => return Err(self.malformed(node, tokens)),
            },
            _ => return Err(self.malformed(node, tokens)),
        };
        Ok(self.expr_at(kind, node, tokens))
    }

    /// Fold a postfix chain left to right: `a.b[c](d)`
    fn build_postfix(&self, node: &ParseNode, tokens: &[Token]) -> Result<Expr, ParseError> {
        let children = node.children();
        let first = children.first().ok_or_else(|| self.malformed(node, tokens))?;
        let start = node.range().start;
        let mut expr = self.build_expr(first, tokens)?;
        for suffix in &children[1..] {
            let base = Box::new(expr);
            let kind = match suffix.name() {
                Some("Index") => ExprKind::Index {
                    base,
                    index: Box::new(self.build_expr(self.child(suffix, 1, tokens)?, tokens)?),
                },
                Some("Call") => ExprKind::Call {
                    callee: base,
                    args: operands(suffix, tokens)
                        .map(|arg| self.build_expr(arg, tokens))
                        .collect::<Result<_, _>>()?,
                },
                Some("Member") => ExprKind::Member {
                    base,
                    field: self.terminal_text(self.child(suffix, 1, tokens)?, tokens)?.clone(),
                },
                Some("Arrow") => ExprKind::PointerMember {
                    base,
                    field: self.terminal_text(self.child(suffix, 1, tokens)?, tokens)?.clone(),
                },
                Some("PostInc") => ExprKind::Unary {
                    op: UnOp::PostInc,
                    operand: base,
                },
                Some("PostDec") => ExprKind::Unary {
                    op: UnOp::PostDec,
                    operand: base,
                },
                _ => return Err(self.malformed(suffix, tokens)),
            };
            let span = ParseNode::Sequence {
                range: start..suffix.range().end,
                children: Vec::new(),
            };
            expr = self.expr_at(kind, &span, tokens);
        }
        Ok(expr)
    }

    fn build_init_item(&self, node: &ParseNode, tokens: &[Token]) -> Result<InitItem, ParseError> {
        if !node.is_form("Designated") {
            return Ok(InitItem {
                designators: Vec::new(),
                value: self.build_expr(node, tokens)?,
            });
        }
        let mut designators = Vec::new();
        for child in node.children() {
            match child.name() {
                Some("FieldDesignator") => designators.push(Designator::Field(
                    self.terminal_text(self.child(child, 1, tokens)?, tokens)?.clone(),
                )),
                Some("IndexDesignator") => designators.push(Designator::Index(
                    self.build_expr(self.child(child, 1, tokens)?, tokens)?,
                )),
                _ => {}
            }
        }
        let value = node
            .children()
            .last()
            .ok_or_else(|| self.malformed(node, tokens))?;
        Ok(InitItem {
            designators,
            value: self.build_expr(value, tokens)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lexer::tokenize;

    fn parse(source: &str) -> Expr {
        let tokens = tokenize(source).unwrap();
        Parser::new().parse_expression(&tokens).unwrap()
    }

    #[test]
    fn test_precedence_and_associativity() {
        let expr = parse("a + b * c - d");
        let ExprKind::Binary { op, lhs, rhs } = expr.kind else {
            panic!("expected binary, got {:?}", expr.kind);
        };
        assert_eq!(op, BinOp::Sub);
        assert_eq!(&*lhs.text, "a + b * c");
        assert_eq!(&*rhs.text, "d");
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let expr = parse("a = b += 2");
        let ExprKind::Assign { value, .. } = expr.kind else {
            panic!("expected assignment");
        };
        assert!(matches!(
            value.kind,
            ExprKind::CompoundAssign { op: BinOp::Add, .. }
        ));
    }

    #[test]
    fn test_postfix_chain() {
        let expr = parse("dev->regs[2].ctrl(x, 1)");
        let ExprKind::Call { callee, args } = expr.kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
        assert_eq!(&*callee.text, "dev -> regs [ 2 ] . ctrl");
        assert!(matches!(callee.kind, ExprKind::Member { .. }));
    }

    #[test]
    fn test_cast_versus_parenthesized_operand() {
        assert!(matches!(parse("(u32)x").kind, ExprKind::Cast(_)));
        assert!(matches!(parse("(struct foo *)p").kind, ExprKind::Cast(_)));
        assert!(matches!(
            parse("(a) - b").kind,
            ExprKind::Binary { op: BinOp::Sub, .. }
        ));
        assert!(matches!(parse("(f)(x)").kind, ExprKind::Call { .. }));
    }

    #[test]
    fn test_ternary_and_logical() {
        let expr = parse("a && b ? c : d || e");
        assert!(matches!(expr.kind, ExprKind::Ternary { .. }));
        assert!(expr.has_short_circuit());
        assert!(!parse("a + f(b)").has_short_circuit());
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse("0x10").kind, ExprKind::Int(16));
        assert_eq!(parse("'A'").kind, ExprKind::Int(65));
        assert_eq!(parse(r#""ab" "cd""#).kind, ExprKind::Str("abcd".into()));
        assert_eq!(parse("1.5").kind, ExprKind::Unrepresentable);
    }

    #[test]
    fn test_raw_arguments_are_accepted() {
        let expr = parse("offsetof(struct foo, bar)");
        let ExprKind::Call { args, .. } = expr.kind else {
            panic!("expected call");
        };
        assert_eq!(args[0].kind, ExprKind::Unrepresentable);
        assert_eq!(&*args[0].text, "struct foo");
    }

    #[test]
    fn test_initializer_list_with_designators() {
        let expr = parse("{ .name = \"uart\", .pins = { 1, 2 }, [3] = x }");
        let ExprKind::InitList(items) = expr.kind else {
            panic!("expected initializer list");
        };
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].designators, vec![Designator::Field("name".into())]);
        assert!(matches!(items[1].value.kind, ExprKind::InitList(ref inner) if inner.len() == 2));
        assert!(matches!(items[2].designators[0], Designator::Index(_)));
    }
}
