//! Pattern-directed rewriting of parse trees
//!
//! A rewrite pairs a hole [`Pattern`] with a [`Template`]. Applying it to a
//! parse node anti-unifies the node against the pattern, then instantiates
//! the template with the bound holes and fresh labels. The result is a token
//! stream meant to be spliced back over the node's range.

pub mod labels;
pub mod pattern;
pub mod template;

pub use labels::{LabelGen, LabelMap};
pub use pattern::Pattern;
pub use template::{Template, TemplatePart};

use crate::parser::ast::{ParseNode, SourceLocation, Span};
use crate::parser::lexer::{LexError, Token};
use std::ops::Range;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error)]
pub enum RewriteError {
    #[error("Rewrite mismatch at {location}: expected `{expected}`, found `{found}`")]
    Mismatch {
        expected: String,
        found: String,
        location: SourceLocation,
    },
    #[error("Template `{template}` uses hole {{{index}}} which the pattern does not bind")]
    UnboundHole { template: String, index: usize },
    #[error("Template `{template}` uses label [{label}] which is not bound")]
    UnboundLabel { template: String, label: String },
}

impl RewriteError {
    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            RewriteError::Mismatch { location, .. } => Some(*location),
            _ => None,
        }
    }
}

/// Where synthetic tokens of a rewrite point back to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Origin {
    pub location: SourceLocation,
    pub span: Span,
}

impl Origin {
    /// Origin covering `tokens[range]`
    pub fn of(tokens: &[Token], range: Range<usize>) -> Self {
        match (tokens.get(range.start), range.end.checked_sub(1).and_then(|i| tokens.get(i))) {
            (Some(first), Some(last)) if range.start < range.end => Self {
                location: first.location,
                span: first.span.cover(last.span),
            },
            _ => {
                let anchor = tokens.get(range.start).or_else(|| tokens.last());
                anchor
                    .map(|t| Self {
                        location: t.location,
                        span: t.span,
                    })
                    .unwrap_or_default()
            }
        }
    }
}

/// A pattern/template pair, both parsed once
#[derive(Debug, Clone)]
pub struct Rewrite {
    pub pattern: Pattern,
    pub template: Template,
}

impl Rewrite {
    pub fn new(pattern: &str, template: &str) -> Result<Self, LexError> {
        Ok(Self {
            pattern: Pattern::parse(pattern)?,
            template: Template::parse(template)?,
        })
    }

    /// Tokens bound to each hole of the pattern
    pub fn bind(&self, node: &ParseNode, tokens: &[Token]) -> Result<Vec<Vec<Token>>, RewriteError> {
        Ok(self
            .pattern
            .anti_unify(node, tokens)?
            .into_iter()
            .map(|range| tokens[range].to_vec())
            .collect())
    }

    /// Instantiate with already-bound holes and labels
    pub fn instantiate(
        &self,
        node: &ParseNode,
        tokens: &[Token],
        holes: &[Vec<Token>],
        labels: &LabelMap,
        source: &str,
    ) -> Result<Vec<Token>, RewriteError> {
        let origin = Origin::of(tokens, node.range());
        let out = self.template.instantiate(holes, labels, &origin, source)?;
        debug!(
            pattern = self.pattern.text(),
            line = origin.location.line,
            tokens = out.len(),
            "rewrote construct"
        );
        Ok(out)
    }

    pub fn apply(
        &self,
        node: &ParseNode,
        tokens: &[Token],
        labels: &mut LabelGen,
        source: &str,
    ) -> Result<Vec<Token>, RewriteError> {
        let holes = self.bind(node, tokens)?;
        let fresh = self.template.fresh_labels(labels);
        self.instantiate(node, tokens, &holes, &fresh, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lexer::{join_text, reconstruct, tokenize};
    use crate::parser::Parser;

    #[test]
    fn test_rewrite_while_into_labels() {
        let source = "while (i < 3) { i++; }";
        let tokens = tokenize(source).unwrap();
        let node = Parser::new().parse_statement(&tokens, 0).unwrap();
        let rule = Rewrite::new(
            "while ( ... ) ...",
            "[lchk]: if ({0}) { {1} goto [lchk]; } [lend]: ;",
        )
        .unwrap();
        let mut labels = LabelGen::new("L");

        let out = rule.apply(&node, &tokens, &mut labels, source).unwrap();

        assert_eq!(
            join_text(&out),
            "L0 : if ( i < 3 ) { { i ++ ; } goto L0 ; } L1 : ;"
        );
    }

    #[test]
    fn test_unchanged_holes_reconstruct_their_source() {
        let source = "if (a /* why */ &&\n    b) run();";
        let tokens = tokenize(source).unwrap();
        let node = Parser::new().parse_statement(&tokens, 0).unwrap();
        let holes = Rewrite::new("if ( ... ) ...", "{0}")
            .unwrap()
            .bind(&node, &tokens)
            .unwrap();

        assert_eq!(reconstruct(&holes[0], source), "a /* why */ &&\n    b");
        assert_eq!(reconstruct(&holes[1], source), "run();");
    }

    #[test]
    fn test_holes_can_be_reordered_around_fresh_labels() {
        let source = "goto_ite (x) a b;";
        let tokens = tokenize(source).unwrap();
        let node = Parser::new().parse_statement(&tokens, 0).unwrap();
        let rule = Rewrite::new("goto_ite ( ... ) ... ... ;", "[t]: goto_ite ({0}) {2} {1};").unwrap();
        let mut labels = LabelGen::new("___l");

        let out = rule.apply(&node, &tokens, &mut labels, source).unwrap();

        assert_eq!(join_text(&out), "___l0 : goto_ite ( x ) b a ;");
        assert_eq!(reconstruct(&out[4..5], source), "x");
    }
}
