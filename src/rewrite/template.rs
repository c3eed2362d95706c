//! Code templates with numbered holes and named labels
//!
//! `{n}` splices the tokens bound to hole `n`; `[name]` becomes the label
//! bound to `name` (fresh per instantiation unless the caller binds it).
//! Everything else is C text.

use super::labels::{LabelGen, LabelMap};
use super::{Origin, RewriteError};
use crate::parser::lexer::{reconstruct, tokenize, LexError, Token, TokenKind};
use rustc_hash::FxHashMap;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(Vec<Token>),
    Hole(usize),
    Label(Rc<str>),
    /// `#arg` in a macro body: the argument's source text as a string literal
    Stringify(usize),
}

#[derive(Debug, Clone)]
pub struct Template {
    parts: Vec<TemplatePart>,
    text: Rc<str>,
}

impl Template {
    pub fn parse(text: &str) -> Result<Self, LexError> {
        let chars: Vec<char> = text.chars().collect();
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut i = 0;
        while i < chars.len() {
            if let Some((part, next)) = placeholder(&chars, i) {
                flush(&mut literal, &mut parts)?;
                parts.push(part);
                i = next;
            } else {
                literal.push(chars[i]);
                i += 1;
            }
        }
        flush(&mut literal, &mut parts)?;
        Ok(Self {
            parts,
            text: text.into(),
        })
    }

    /// Build a template from ready-made parts (macro bodies)
    pub fn from_parts(parts: Vec<TemplatePart>, text: impl Into<Rc<str>>) -> Self {
        Self {
            parts,
            text: text.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn label_names(&self) -> impl Iterator<Item = &Rc<str>> {
        self.parts.iter().filter_map(|part| match part {
            TemplatePart::Label(name) => Some(name),
            _ => None,
        })
    }

    /// Bind every label of the template to a fresh name
    pub fn fresh_labels(&self, labels: &mut LabelGen) -> LabelMap {
        let mut map = FxHashMap::default();
        for name in self.label_names() {
            if !map.contains_key(name) {
                map.insert(name.clone(), labels.fresh());
            }
        }
        map
    }

    /// Produce the replacement token stream.
    ///
    /// Hole tokens are copied as they are; template text and labels become
    /// synthetic tokens located at the token before them (or at `origin`).
    pub fn instantiate(
        &self,
        holes: &[Vec<Token>],
        labels: &LabelMap,
        origin: &Origin,
        source: &str,
    ) -> Result<Vec<Token>, RewriteError> {
        let mut out: Vec<Token> = Vec::new();
        for part in &self.parts {
            let location = out.last().map(|t| t.location).unwrap_or(origin.location);
            match part {
                TemplatePart::Text(tokens) => {
                    for token in tokens {
                        let location = out.last().map(|t| t.location).unwrap_or(origin.location);
                        out.push(token.synthesized(location, origin.span));
                    }
                }
                TemplatePart::Hole(index) => {
                    let bound = holes.get(*index).ok_or_else(|| RewriteError::UnboundHole {
                        template: self.text.to_string(),
                        index: *index,
                    })?;
                    out.extend(bound.iter().cloned());
                }
                TemplatePart::Label(name) => {
                    let label = labels.get(name).ok_or_else(|| RewriteError::UnboundLabel {
                        template: self.text.to_string(),
                        label: name.to_string(),
                    })?;
                    let mut token = Token::new(TokenKind::Ident, label.clone(), location, origin.span);
                    token.synthetic = true;
                    out.push(token);
                }
                TemplatePart::Stringify(index) => {
                    let bound = holes.get(*index).ok_or_else(|| RewriteError::UnboundHole {
                        template: self.text.to_string(),
                        index: *index,
                    })?;
                    let text = reconstruct(bound, source);
                    let quoted = format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""));
                    let mut token = Token::new(TokenKind::Str, quoted, location, origin.span);
                    token.synthetic = true;
                    out.push(token);
                }
            }
        }
        Ok(out)
    }
}

/// `{n}` or `[name]` starting at `i`
fn placeholder(chars: &[char], i: usize) -> Option<(TemplatePart, usize)> {
    let (close, is_hole) = match chars[i] {
        '{' => ('}', true),
        '[' => (']', false),
        _ => return None,
    };
    let mut j = i + 1;
    let mut name = String::new();
    while j < chars.len() && chars[j] != close {
        let ok = if is_hole {
            chars[j].is_ascii_digit()
        } else {
            chars[j].is_ascii_alphanumeric() || chars[j] == '_'
        };
        if !ok {
            return None;
        }
        name.push(chars[j]);
        j += 1;
    }
    if j >= chars.len() || name.is_empty() {
        return None;
    }
    let part = if is_hole {
        TemplatePart::Hole(name.parse().ok()?)
    } else {
        TemplatePart::Label(name.into())
    };
    Some((part, j + 1))
}

fn flush(literal: &mut String, parts: &mut Vec<TemplatePart>) -> Result<(), LexError> {
    if !literal.trim().is_empty() {
        parts.push(TemplatePart::Text(tokenize(literal)?));
    }
    literal.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::{SourceLocation, Span};
    use crate::parser::lexer::join_text;

    #[test]
    fn test_braces_are_code_unless_they_hold_a_number() {
        let template = Template::parse("[lif]: { {1} goto [lend]; }").unwrap();
        let holes = vec![vec![], tokenize("x = 1;").unwrap()];
        let mut labels = LabelMap::default();
        labels.insert("lif".into(), "L1".into());
        labels.insert("lend".into(), "L2".into());
        let origin = Origin {
            location: SourceLocation::new(7, 3),
            span: Span::new(40, 60),
        };

        let out = template.instantiate(&holes, &labels, &origin, "").unwrap();

        assert_eq!(join_text(&out), "L1 : { x = 1 ; goto L2 ; }");
        assert!(out[0].synthetic);
        assert_eq!(out[0].location.line, 7);
        assert_eq!(out[0].span, Span::new(40, 60));
        // hole tokens keep their own identity
        assert!(!out[3].synthetic);
        assert_eq!(out[3].location.line, 1);
        // text after a hole takes the line of the token before it
        assert_eq!(out[7].location.line, 1);
    }

    #[test]
    fn test_unbound_hole_is_an_error() {
        let template = Template::parse("goto_ite ({0}) [a] [b];").unwrap();
        let mut labels = LabelGen::new("t");
        let map = template.fresh_labels(&mut labels);
        let origin = Origin::default();

        assert_eq!(map.len(), 2);
        assert!(matches!(
            template.instantiate(&[], &map, &origin, ""),
            Err(RewriteError::UnboundHole { index: 0, .. })
        ));
    }
}
