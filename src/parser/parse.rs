use crate::parser::ast::*;
use crate::parser::declarations::define_declaration_rules;
use crate::parser::expressions::define_expression_rules;
use crate::parser::grammar::control_flow_grammar;
use crate::parser::lexer::Token;
use crate::parser::peg::*;
use std::ops::Range;

pub use crate::parser::peg::ParseError;

/// Holds the two grammars of the front end: control flow, which parses
/// statements with holes, and expressions, which fills in the holes that
/// need to be understood.
#[derive(Debug, Clone)]
pub struct Parser {
    pub(crate) control: Grammar,
    pub(crate) expressions: Grammar,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        let mut expressions = Grammar::new("expressions");
        define_expression_rules(&mut expressions);
        define_declaration_rules(&mut expressions);
        expressions.define(
            "SimpleStatement",
            choice([
                form("Empty", end()),
                form("TypeOnly", sequence([lit("typedef"), skip_to(end())])),
                sequence([rule("Decl"), end()]),
                sequence([rule("Expr"), end()]),
            ]),
        );
        Self {
            control: control_flow_grammar(),
            expressions,
        }
    }

    /// Parse the statement starting at `pos`; the node's range tells where
    /// it ends
    pub fn parse_statement(&self, tokens: &[Token], pos: usize) -> Result<ParseNode, ParseError> {
        self.control
            .parse("Statement", tokens, pos)
            .map(|(node, _)| node)
    }

    /// Expression parse tree for `tokens[range]`, positioned in `tokens`
    pub fn expression_tree(&self, tokens: &[Token], range: Range<usize>) -> Result<ParseNode, ParseError> {
        let offset = range.start;
        let mut tree = self.expressions.parse_complete("Expr", &tokens[range])?;
        tree.shift(offset);
        Ok(tree)
    }

    /// Parse-tree form of a `;`-less statement body, positioned in `tokens`
    pub fn simple_statement_tree(
        &self,
        tokens: &[Token],
        range: Range<usize>,
    ) -> Result<ParseNode, ParseError> {
        let offset = range.start;
        let mut tree = self
            .expressions
            .parse_complete("SimpleStatement", &tokens[range])?;
        tree.shift(offset);
        Ok(tree)
    }

    pub fn parse_expression(&self, tokens: &[Token]) -> Result<Expr, ParseError> {
        let tree = self.expression_tree(tokens, 0..tokens.len())?;
        self.build_expr(&tree, tokens)
    }

    /// Parse what a `Line` statement holds (without its `;`)
    pub fn parse_simple_statement(&self, tokens: &[Token]) -> Result<SimpleStatement, ParseError> {
        let tree = self.simple_statement_tree(tokens, 0..tokens.len())?;
        self.build_simple_statement(&tree, tokens)
    }

    pub(crate) fn build_simple_statement(
        &self,
        tree: &ParseNode,
        tokens: &[Token],
    ) -> Result<SimpleStatement, ParseError> {
        Ok(match tree.name() {
            Some("Empty") => SimpleStatement::Empty,
            Some("TypeOnly") => SimpleStatement::TypeOnly,
            Some("Decl") => SimpleStatement::Declaration(self.build_declaration(tree, tokens)?),
            _ => SimpleStatement::Expression(self.build_expr(tree, tokens)?),
        })
    }
}
