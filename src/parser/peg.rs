//! Parsing-expression-grammar engine with holes
//!
//! Grammars are tables of named [`Rule`]s built from a handful of
//! combinators. Besides the usual PEG operators (sequence, ordered choice,
//! repetition, lookahead) the engine knows two hole-producing rules:
//!
//! - [`balanced`] matches a bracketed token run without parsing its inside
//! - [`skip_to`] lazily skips (bracket-aware) tokens until a rule matches
//!
//! Binary operators are handled by [`climb`], a precedence-climbing rule that
//! produces left-associative `Binary` forms. Named rules are memoized per
//! parse (packrat), so backtracking through nested parentheses stays linear.

use super::ast::{ParseNode, SourceLocation};
use super::lexer::{Token, TokenKind};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Predicate over the tokens matched by a rule
pub type TokenCheck = fn(&[Token]) -> bool;

#[derive(Debug, Clone)]
pub enum Rule {
    /// A token with exactly this text
    Lit(&'static str),
    /// Any token of this kind
    Kind(TokenKind),
    Any,
    End,
    /// Reference to a named rule; transparent in the tree
    Ref(&'static str),
    /// Labels whatever `inner` matched as a named construct
    Form(&'static str, Box<Rule>),
    Seq(Vec<Rule>),
    Choice(Vec<Rule>),
    Repeat(Box<Rule>),
    Optional(Box<Rule>),
    Not(Box<Rule>),
    And(Box<Rule>),
    Balanced(&'static str, &'static str),
    SkipTo(Box<Rule>),
    Check(Box<Rule>, TokenCheck),
    Climb {
        operand: Box<Rule>,
        tiers: Vec<Vec<&'static str>>,
    },
}

pub fn lit(text: &'static str) -> Rule {
    Rule::Lit(text)
}

pub fn kind(kind: TokenKind) -> Rule {
    Rule::Kind(kind)
}

pub fn any() -> Rule {
    Rule::Any
}

pub fn end() -> Rule {
    Rule::End
}

pub fn rule(name: &'static str) -> Rule {
    Rule::Ref(name)
}

pub fn form(name: &'static str, inner: Rule) -> Rule {
    Rule::Form(name, Box::new(inner))
}

pub fn sequence(rules: impl IntoIterator<Item = Rule>) -> Rule {
    Rule::Seq(rules.into_iter().collect())
}

pub fn choice(rules: impl IntoIterator<Item = Rule>) -> Rule {
    Rule::Choice(rules.into_iter().collect())
}

/// Any of the given literal tokens
pub fn one_of(texts: &[&'static str]) -> Rule {
    choice(texts.iter().map(|t| lit(t)))
}

pub fn repeat(inner: Rule) -> Rule {
    Rule::Repeat(Box::new(inner))
}

/// One or more
pub fn repeat1(inner: Rule) -> Rule {
    sequence([inner.clone(), repeat(inner)])
}

pub fn optional(inner: Rule) -> Rule {
    Rule::Optional(Box::new(inner))
}

/// Negative lookahead
pub fn not(inner: Rule) -> Rule {
    Rule::Not(Box::new(inner))
}

/// Positive lookahead
pub fn ahead(inner: Rule) -> Rule {
    Rule::And(Box::new(inner))
}

pub fn balanced(open: &'static str, close: &'static str) -> Rule {
    Rule::Balanced(open, close)
}

pub fn skip_to(stop: Rule) -> Rule {
    Rule::SkipTo(Box::new(stop))
}

pub fn check(inner: Rule, predicate: TokenCheck) -> Rule {
    Rule::Check(Box::new(inner), predicate)
}

/// Left-associative binary operators, loosest tier first
pub fn climb(operand: Rule, tiers: &[&[&'static str]]) -> Rule {
    Rule::Climb {
        operand: Box::new(operand),
        tiers: tiers.iter().map(|t| t.to_vec()).collect(),
    }
}

/// Parse failure, reported at the furthest position any rule reached
#[derive(Debug, Clone, Error)]
#[error(
    "Parse error at {location}: unexpected {found}; expected {}{}",
    .expected.join(" or "),
    forms_suffix(.attempted)
)]
pub struct ParseError {
    pub location: SourceLocation,
    pub found: String,
    /// Tokens that would have let the parse continue
    pub expected: Vec<String>,
    /// Forms tried, in order, at the starting position
    pub attempted: Vec<&'static str>,
}

fn forms_suffix(attempted: &[&'static str]) -> String {
    if attempted.is_empty() {
        String::new()
    } else {
        format!(" (tried {})", attempted.join(", "))
    }
}

impl ParseError {
    pub fn location(&self) -> SourceLocation {
        self.location
    }
}

/// Closing bracket for an opening one
pub fn closer_of(open: &str) -> Option<&'static str> {
    match open {
        "(" => Some(")"),
        "[" => Some("]"),
        "{" => Some("}"),
        _ => None,
    }
}

fn is_closer(token: &Token) -> bool {
    token.kind == TokenKind::Punct && matches!(&*token.text, ")" | "]" | "}")
}

/// Index of the token closing the group opened at `pos`
pub fn find_balance(tokens: &[Token], pos: usize, open: &str, close: &str) -> Option<usize> {
    if !tokens.get(pos)?.is(open) {
        return None;
    }
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(pos) {
        if token.kind != TokenKind::Punct {
            continue;
        }
        if token.is(open) {
            depth += 1;
        } else if token.is(close) {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

fn describe(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Ident => "identifier",
        TokenKind::Number => "number",
        TokenKind::Str => "string literal",
        TokenKind::Char => "character literal",
        TokenKind::Punct => "punctuator",
        TokenKind::Preproc => "preprocessor line",
    }
}

/// A named set of rules
#[derive(Debug, Clone)]
pub struct Grammar {
    name: &'static str,
    rules: FxHashMap<&'static str, Rule>,
}

impl Grammar {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rules: FxHashMap::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Add or replace a named rule
    pub fn define(&mut self, name: &'static str, rule: Rule) -> &mut Self {
        self.rules.insert(name, rule);
        self
    }

    /// Match `start` at `pos`, returning the tree and the position after it
    pub fn parse(
        &self,
        start: &'static str,
        tokens: &[Token],
        pos: usize,
    ) -> Result<(ParseNode, usize), ParseError> {
        let mut run = Run::new(self, tokens, pos);
        match run.apply(&Rule::Ref(start), pos) {
            Some(result) => Ok(result),
            None => Err(run.error()),
        }
    }

    /// Match `start` against the whole token slice
    pub fn parse_complete(&self, start: &'static str, tokens: &[Token]) -> Result<ParseNode, ParseError> {
        let mut run = Run::new(self, tokens, 0);
        let whole = Rule::Seq(vec![Rule::Ref(start), Rule::End]);
        match run.apply(&whole, 0) {
            Some((node, _)) => match node {
                ParseNode::Sequence { mut children, .. } if children.len() == 1 => {
                    Ok(children.remove(0))
                }
                other => Ok(other),
            },
            None => Err(run.error()),
        }
    }
}

type Memo = FxHashMap<(&'static str, usize), Option<(ParseNode, usize)>>;

/// State of one parse call
struct Run<'g, 't> {
    grammar: &'g Grammar,
    tokens: &'t [Token],
    start: usize,
    memo: Memo,
    furthest: usize,
    expected: Vec<String>,
    attempted: Vec<&'static str>,
    quiet: usize,
}

impl<'g, 't> Run<'g, 't> {
    fn new(grammar: &'g Grammar, tokens: &'t [Token], start: usize) -> Self {
        Self {
            grammar,
            tokens,
            start,
            memo: FxHashMap::default(),
            furthest: start,
            expected: Vec::new(),
            attempted: Vec::new(),
            quiet: 0,
        }
    }

    fn fail(&mut self, pos: usize, what: impl FnOnce() -> String) {
        if self.quiet > 0 || pos < self.furthest {
            return;
        }
        if pos > self.furthest {
            self.furthest = pos;
            self.expected.clear();
        }
        let what = what();
        if !self.expected.contains(&what) {
            self.expected.push(what);
        }
    }

    fn error(&self) -> ParseError {
        let (location, found) = match self.tokens.get(self.furthest) {
            Some(token) => (token.location, format!("'{}'", token.text)),
            None => (
                self.tokens.last().map(|t| t.location).unwrap_or_default(),
                "end of input".to_string(),
            ),
        };
        ParseError {
            location,
            found,
            expected: self.expected.clone(),
            attempted: self.attempted.clone(),
        }
    }

    fn empty(pos: usize) -> ParseNode {
        ParseNode::Sequence {
            range: pos..pos,
            children: Vec::new(),
        }
    }

    /// Sequence children are spliced into their parent
    fn push_flat(children: &mut Vec<ParseNode>, node: ParseNode) {
        match node {
            ParseNode::Sequence { children: inner, .. } => children.extend(inner),
            other => children.push(other),
        }
    }

    fn apply(&mut self, rule: &'g Rule, pos: usize) -> Option<(ParseNode, usize)> {
        let tokens = self.tokens;
        match rule {
            Rule::Lit(text) => match tokens.get(pos) {
                Some(token) if token.is(text) => Some((ParseNode::Terminal(pos), pos + 1)),
                _ => {
                    self.fail(pos, || format!("'{}'", text));
                    None
                }
            },
            Rule::Kind(kind) => match tokens.get(pos) {
                Some(token) if token.kind == *kind => Some((ParseNode::Terminal(pos), pos + 1)),
                _ => {
                    self.fail(pos, || describe(*kind).to_string());
                    None
                }
            },
            Rule::Any => match tokens.get(pos) {
                Some(_) => Some((ParseNode::Terminal(pos), pos + 1)),
                None => {
                    self.fail(pos, || "any token".to_string());
                    None
                }
            },
            Rule::End => {
                if pos == tokens.len() {
                    Some((Self::empty(pos), pos))
                } else {
                    self.fail(pos, || "end of input".to_string());
                    None
                }
            }
            Rule::Ref(name) => self.apply_named(*name, pos),
            Rule::Form(name, inner) => {
                let Some((node, end)) = self.apply(inner, pos) else {
                    if pos == self.start && self.quiet == 0 && !self.attempted.contains(name) {
                        self.attempted.push(*name);
                    }
                    return None;
                };
                let mut children = Vec::new();
                Self::push_flat(&mut children, node);
                Some((
                    ParseNode::Form {
                        name: *name,
                        range: pos..end,
                        children,
                    },
                    end,
                ))
            }
            Rule::Seq(rules) => {
                let mut children = Vec::new();
                let mut cur = pos;
                for rule in rules {
                    let (node, end) = self.apply(rule, cur)?;
                    Self::push_flat(&mut children, node);
                    cur = end;
                }
                Some((
                    ParseNode::Sequence {
                        range: pos..cur,
                        children,
                    },
                    cur,
                ))
            }
            Rule::Choice(rules) => {
                for rule in rules {
                    if let Some(result) = self.apply(rule, pos) {
                        return Some(result);
                    }
                }
                None
            }
            Rule::Repeat(inner) => {
                let mut children = Vec::new();
                let mut cur = pos;
                while let Some((node, end)) = self.apply(inner, cur) {
                    if end == cur {
                        break;
                    }
                    Self::push_flat(&mut children, node);
                    cur = end;
                }
                Some((
                    ParseNode::Sequence {
                        range: pos..cur,
                        children,
                    },
                    cur,
                ))
            }
            Rule::Optional(inner) => self.apply(inner, pos).or_else(|| Some((Self::empty(pos), pos))),
            Rule::Not(inner) => {
                self.quiet += 1;
                let matched = self.apply(inner, pos).is_some();
                self.quiet -= 1;
                if matched {
                    None
                } else {
                    Some((Self::empty(pos), pos))
                }
            }
            Rule::And(inner) => {
                self.quiet += 1;
                let matched = self.apply(inner, pos).is_some();
                self.quiet -= 1;
                matched.then(|| (Self::empty(pos), pos))
            }
            Rule::Balanced(open, close) => match find_balance(tokens, pos, open, close) {
                Some(last) => Some((
                    ParseNode::Hole {
                        range: pos..last + 1,
                        delimited: true,
                    },
                    last + 1,
                )),
                None => {
                    self.fail(pos, || format!("'{}'", open));
                    None
                }
            },
            Rule::SkipTo(stop) => {
                let mut cur = pos;
                loop {
                    if let Some((node, end)) = self.apply(stop, cur) {
                        let mut children = vec![ParseNode::Hole {
                            range: pos..cur,
                            delimited: false,
                        }];
                        Self::push_flat(&mut children, node);
                        return Some((
                            ParseNode::Sequence {
                                range: pos..end,
                                children,
                            },
                            end,
                        ));
                    }
                    let token = tokens.get(cur)?;
                    if is_closer(token) {
                        return None;
                    }
                    cur = match closer_of(&token.text).filter(|_| token.kind == TokenKind::Punct) {
                        Some(close) => find_balance(tokens, cur, &token.text, close)? + 1,
                        None => cur + 1,
                    };
                }
            }
            Rule::Check(inner, predicate) => {
                let (node, end) = self.apply(inner, pos)?;
                predicate(&tokens[pos..end]).then_some((node, end))
            }
            Rule::Climb { operand, tiers } => self.climb(operand, tiers, 0, pos),
        }
    }

    fn apply_named(&mut self, name: &'static str, pos: usize) -> Option<(ParseNode, usize)> {
        if let Some(cached) = self.memo.get(&(name, pos)) {
            return cached.clone();
        }
        let grammar = self.grammar;
        let result = match grammar.rules.get(name) {
            Some(rule) => self.apply(rule, pos),
            None => {
                self.fail(pos, || format!("<{}>", name));
                None
            }
        };
        self.memo.insert((name, pos), result.clone());
        result
    }

    fn climb(
        &mut self,
        operand: &'g Rule,
        tiers: &'g [Vec<&'static str>],
        level: usize,
        pos: usize,
    ) -> Option<(ParseNode, usize)> {
        let Some(tier) = tiers.get(level) else {
            return self.apply(operand, pos);
        };
        let (mut lhs, mut cur) = self.climb(operand, tiers, level + 1, pos)?;
        while let Some(token) = self.tokens.get(cur) {
            if token.kind != TokenKind::Punct || !tier.iter().any(|op| *op == &*token.text) {
                break;
            }
            let Some((rhs, end)) = self.climb(operand, tiers, level + 1, cur + 1) else {
                break;
            };
            lhs = ParseNode::Form {
                name: "Binary",
                range: pos..end,
                children: vec![lhs, ParseNode::Terminal(cur), rhs],
            };
            cur = end;
        }
        Some((lhs, cur))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lexer::tokenize;

    fn arithmetic() -> Grammar {
        let mut grammar = Grammar::new("arith");
        grammar
            .define("Expr", climb(rule("Atom"), &[&["+", "-"], &["*", "/"]]))
            .define(
                "Atom",
                choice([
                    form("Paren", sequence([lit("("), rule("Expr"), lit(")")])),
                    kind(TokenKind::Number),
                    kind(TokenKind::Ident),
                ]),
            );
        grammar
    }

    #[test]
    fn test_climb_is_left_associative_with_precedence() {
        let tokens = tokenize("a - b - c * d").unwrap();
        let tree = arithmetic().parse_complete("Expr", &tokens).unwrap();

        // ((a - b) - (c * d))
        assert!(tree.is_form("Binary"));
        let children = tree.children();
        assert_eq!(children[0].range(), 0..3);
        assert!(children[0].is_form("Binary"));
        assert_eq!(children[1], ParseNode::Terminal(3));
        assert_eq!(children[2].range(), 4..7);
    }

    #[test]
    fn test_balanced_hole_keeps_inside_unparsed() {
        let mut grammar = Grammar::new("holes");
        grammar.define(
            "If",
            form("If", sequence([lit("if"), balanced("(", ")"), balanced("{", "}")])),
        );
        let tokens = tokenize("if (a (b) c) { ) ] }").unwrap();
        let tree = grammar.parse_complete("If", &tokens).unwrap();

        assert_eq!(
            tree.children()[1],
            ParseNode::Hole {
                range: 1..8,
                delimited: true
            }
        );
        assert_eq!(tree.children()[1].inner(), 2..7);
        assert_eq!(tree.children()[2].range(), 8..12);
    }

    #[test]
    fn test_ordered_choice_backtracks() {
        let mut grammar = Grammar::new("choice");
        grammar.define(
            "Stmt",
            choice([
                form("Label", sequence([kind(TokenKind::Ident), lit(":")])),
                form("Line", sequence([skip_to(lit(";"))])),
            ]),
        );
        let tokens = tokenize("x = 1;").unwrap();
        let (tree, end) = grammar.parse("Stmt", &tokens, 0).unwrap();

        assert!(tree.is_form("Line"));
        assert_eq!(end, 4);
        assert_eq!(
            tree.children()[0],
            ParseNode::Hole {
                range: 0..3,
                delimited: false
            }
        );
    }

    #[test]
    fn test_skip_to_steps_over_groups_but_not_out_of_them() {
        let mut grammar = Grammar::new("skip");
        grammar.define("Line", skip_to(lit(";")));

        let tokens = tokenize("f(a; b); g").unwrap();
        let (_, end) = grammar.parse("Line", &tokens, 0).unwrap();
        assert_eq!(end, 7);

        let tokens = tokenize("x } ;").unwrap();
        assert!(grammar.parse("Line", &tokens, 0).is_err());
    }

    #[test]
    fn test_error_reports_furthest_position() {
        let tokens = tokenize("(a + )").unwrap();
        let err = arithmetic().parse_complete("Expr", &tokens).unwrap_err();

        assert_eq!(err.location.column, 6);
        assert_eq!(err.found, "')'");
        assert!(err.expected.contains(&"number".to_string()));
    }
}
