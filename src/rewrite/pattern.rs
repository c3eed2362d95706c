//! Hole patterns and anti-unification
//!
//! A pattern is a token sequence in which `...` stands for a hole, e.g.
//! `while ( ... ) ...`. Matching a parse node against a pattern views the
//! node as a row of units: its own tokens, with sub-constructs and bracketed
//! groups kept whole. Literals must equal single-token units; a hole takes
//! the shortest run of units that lets the rest of the pattern match. A hole
//! directly followed by another hole takes exactly one unit.

use super::RewriteError;
use crate::parser::ast::ParseNode;
use crate::parser::lexer::{join_text, tokenize, LexError, Token, TokenKind};
use crate::parser::peg::{closer_of, find_balance};
use std::ops::Range;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
enum Item {
    Lit(Rc<str>),
    Hole,
}

#[derive(Debug, Clone)]
pub struct Pattern {
    items: Vec<Item>,
    text: Rc<str>,
}

impl Pattern {
    pub fn parse(text: &str) -> Result<Self, LexError> {
        let items = tokenize(text)?
            .into_iter()
            .map(|token| {
                if token.is("...") {
                    Item::Hole
                } else {
                    Item::Lit(token.text)
                }
            })
            .collect();
        Ok(Self {
            items,
            text: text.into(),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn holes(&self) -> usize {
        self.items.iter().filter(|i| **i == Item::Hole).count()
    }

    /// Token range bound to each hole, in pattern order
    pub fn anti_unify(&self, node: &ParseNode, tokens: &[Token]) -> Result<Vec<Range<usize>>, RewriteError> {
        let units = units(node, tokens);
        let mut bindings = Vec::new();
        let end = node.range().end;
        if self.match_from(0, 0, &units, tokens, end, &mut bindings) {
            return Ok(bindings);
        }
        let range = node.range();
        Err(RewriteError::Mismatch {
            expected: self.text.to_string(),
            found: join_text(&tokens[range.clone()]),
            location: tokens.get(range.start).map(|t| t.location).unwrap_or_default(),
        })
    }

    fn match_from(
        &self,
        item: usize,
        unit: usize,
        units: &[Range<usize>],
        tokens: &[Token],
        end: usize,
        bindings: &mut Vec<Range<usize>>,
    ) -> bool {
        let Some(current) = self.items.get(item) else {
            return unit == units.len();
        };
        match current {
            Item::Lit(text) => {
                let matches = units
                    .get(unit)
                    .is_some_and(|u| u.len() == 1 && tokens[u.start].is(text));
                matches && self.match_from(item + 1, unit + 1, units, tokens, end, bindings)
            }
            Item::Hole => {
                let start = units.get(unit).map(|u| u.start).unwrap_or(end);
                let stops = if self.items.get(item + 1) == Some(&Item::Hole) {
                    unit + 1..=(unit + 1).min(units.len())
                } else {
                    unit..=units.len()
                };
                for stop in stops {
                    let hole_end = if stop > unit { units[stop - 1].end } else { start };
                    bindings.push(start..hole_end);
                    if self.match_from(item + 1, stop, units, tokens, end, bindings) {
                        return true;
                    }
                    bindings.pop();
                }
                false
            }
        }
    }
}

/// The node's own tokens with sub-forms and bracket groups kept whole
fn units(node: &ParseNode, tokens: &[Token]) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    match node {
        ParseNode::Form { children, .. } | ParseNode::Sequence { children, .. } => {
            for child in children {
                push_child_units(child, tokens, &mut out);
            }
        }
        other => push_child_units(other, tokens, &mut out),
    }
    out
}

fn push_child_units(node: &ParseNode, tokens: &[Token], out: &mut Vec<Range<usize>>) {
    match node {
        ParseNode::Terminal(i) => out.push(*i..*i + 1),
        ParseNode::Hole { range, delimited } => {
            let mut i = range.start;
            while i < range.end {
                let token = &tokens[i];
                let opens_group = token.kind == TokenKind::Punct && !(*delimited && i == range.start);
                let close = closer_of(&token.text)
                    .filter(|_| opens_group)
                    .and_then(|close| find_balance(tokens, i, &token.text, close))
                    .filter(|close| *close < range.end);
                match close {
                    Some(close) => {
                        out.push(i..close + 1);
                        i = close + 1;
                    }
                    None => {
                        out.push(i..i + 1);
                        i += 1;
                    }
                }
            }
        }
        ParseNode::Sequence { children, .. } => {
            for child in children {
                push_child_units(child, tokens, out);
            }
        }
        ParseNode::Form { range, .. } => out.push(range.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn bind(pattern: &str, source: &str) -> Result<Vec<String>, RewriteError> {
        let tokens = tokenize(source).unwrap();
        let node = Parser::new().parse_statement(&tokens, 0).unwrap();
        let ranges = Pattern::parse(pattern).unwrap().anti_unify(&node, &tokens)?;
        Ok(ranges.into_iter().map(|r| join_text(&tokens[r])).collect())
    }

    #[test]
    fn test_while_binds_condition_and_body() {
        let holes = bind("while ( ... ) ...", "while (f(a) && b) { x++; }").unwrap();
        assert_eq!(holes, ["f ( a ) && b", "{ x ++ ; }"]);
    }

    #[test]
    fn test_for_splits_header_on_semicolons() {
        let holes = bind("for ( ... ; ... ; ... ) ...", "for (i = 0; i < n; i++) s += i;").unwrap();
        assert_eq!(holes, ["i = 0", "i < n", "i ++", "s += i ;"]);

        let holes = bind("for ( ... ; ... ; ... ) ...", "for (;;) { }").unwrap();
        assert_eq!(holes, ["", "", "", "{ }"]);
    }

    #[test]
    fn test_if_else_bodies_are_atomic() {
        let holes = bind(
            "if ( ... ) ... else ...",
            "if (a) if (b) x; else y; else z;",
        );
        // the inner if-else is one unit, so the outer else binds last
        assert_eq!(holes.unwrap(), ["a", "if ( b ) x ; else y ;", "z ;"]);
    }

    #[test]
    fn test_mismatch_reports_pattern_and_location() {
        let err = bind("while ( ... ) ...", "\n  if (a) b;").unwrap_err();
        let RewriteError::Mismatch {
            expected, location, ..
        } = err
        else {
            panic!("expected a mismatch");
        };
        assert_eq!(expected, "while ( ... ) ...");
        assert_eq!(location.line, 2);
    }
}
