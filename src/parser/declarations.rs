//! Declaration parsing implementation
//!
//! Declarations are recognized by shape only: a run of specifier words
//! (each followed by another word or a `*`), optional `struct`/`union`/`enum`
//! tags with bodies, then comma-separated declarators.
//!
//! ```text
//! declaration ::= spec+ (declarator ("," declarator)*)?
//! spec        ::= ("struct" | "union" | "enum") ident? {...}? | ident &(ident | "*")
//! declarator  ::= ("*" | "const")* ident ([...] | (...))* ("=" assign)?
//! ```
//!
//! Struct and union bodies are holes; only enum bodies are looked into, for
//! their constants.
//!
//! All parsing methods are implemented as `pub(crate)` methods on the [`Parser`] struct.

use super::ast::*;
use super::lexer::{Token, TokenKind};
use super::parse::Parser;
use super::peg::*;

const QUALIFIERS: &[&str] = &["const", "volatile", "restrict", "__iomem", "__user"];

pub(crate) fn define_declaration_rules(grammar: &mut Grammar) {
    grammar
        .define(
            "Decl",
            form(
                "Decl",
                sequence([
                    rule("DeclSpec"),
                    optional(sequence([
                        rule("Declarator"),
                        repeat(sequence([lit(","), rule("Declarator")])),
                    ])),
                ]),
            ),
        )
        .define(
            "DeclSpec",
            form(
                "DeclSpec",
                repeat1(choice([
                    rule("Tagged"),
                    sequence([
                        not(lit("sizeof")),
                        kind(TokenKind::Ident),
                        ahead(choice([kind(TokenKind::Ident), lit("*")])),
                    ]),
                ])),
            ),
        )
        .define(
            "Tagged",
            form(
                "Tagged",
                sequence([
                    one_of(&["struct", "union", "enum"]),
                    optional(kind(TokenKind::Ident)),
                    optional(balanced("{", "}")),
                ]),
            ),
        )
        .define(
            "Declarator",
            form(
                "Declarator",
                sequence([
                    repeat(choice([lit("*"), one_of(QUALIFIERS)])),
                    kind(TokenKind::Ident),
                    repeat(choice([balanced("[", "]"), balanced("(", ")")])),
                    optional(sequence([lit("="), rule("Assign")])),
                ]),
            ),
        )
        .define(
            "Enumerators",
            sequence([
                rule("Enumerator"),
                repeat(sequence([lit(","), rule("Enumerator")])),
                optional(lit(",")),
            ]),
        )
        .define(
            "Enumerator",
            form(
                "Enumerator",
                sequence([
                    kind(TokenKind::Ident),
                    optional(sequence([lit("="), rule("Ternary")])),
                ]),
            ),
        );
}

impl Parser {
    /// Convert a `Decl` tree into a [`Declaration`]
    pub(crate) fn build_declaration(
        &self,
        node: &ParseNode,
        tokens: &[Token],
    ) -> Result<Declaration, ParseError> {
        let mut declaration = Declaration::default();
        for child in node.children() {
            match child.name() {
                Some("DeclSpec") => {
                    for spec in child.children() {
                        if spec.is_form("Tagged") {
                            self.collect_enumerators(spec, tokens, &mut declaration)?;
                        }
                    }
                }
                Some("Declarator") => declaration
                    .declarators
                    .push(self.build_declarator(child, tokens)?),
                _ => {}
            }
        }
        Ok(declaration)
    }

    fn collect_enumerators(
        &self,
        tagged: &ParseNode,
        tokens: &[Token],
        declaration: &mut Declaration,
    ) -> Result<(), ParseError> {
        let is_enum = matches!(tagged.children().first(), Some(ParseNode::Terminal(i)) if tokens[*i].is("enum"));
        let body = tagged
            .children()
            .iter()
            .find(|c| matches!(c, ParseNode::Hole { .. }));
        let (true, Some(body)) = (is_enum, body) else {
            return Ok(());
        };
        let inner = body.inner();
        if inner.is_empty() {
            return Ok(());
        }
        let mut tree = self
            .expressions
            .parse_complete("Enumerators", &tokens[inner.clone()])?;
        tree.shift(inner.start);
        let items: Vec<&ParseNode> = if tree.is_form("Enumerator") {
            vec![&tree]
        } else {
            tree.children()
                .iter()
                .filter(|c| c.is_form("Enumerator"))
                .collect()
        };
        for item in items {
            let name = match item.children().first() {
                Some(ParseNode::Terminal(i)) => tokens[*i].text.clone(),
                _ => continue,
            };
            let value = match item.children().get(2) {
                Some(expr) => Some(self.build_expr(expr, tokens)?),
                None => None,
            };
            declaration.enumerators.push(Enumerator {
                name,
                value,
                line: tokens[item.range().start].line(),
            });
        }
        Ok(())
    }

    fn build_declarator(&self, node: &ParseNode, tokens: &[Token]) -> Result<Declarator, ParseError> {
        let children = node.children();
        let mut name = None;
        let mut is_array = false;
        let mut is_function = false;
        let mut init = None;
        for (index, child) in children.iter().enumerate() {
            match child {
                ParseNode::Terminal(i) => {
                    let token = &tokens[*i];
                    if token.is("=") {
                        if let Some(value) = children.get(index + 1) {
                            init = Some(self.build_expr(value, tokens)?);
                        }
                        break;
                    }
                    if name.is_none()
                        && token.kind == TokenKind::Ident
                        && !QUALIFIERS.contains(&&*token.text)
                    {
                        name = Some(token.text.clone());
                    }
                }
                ParseNode::Hole { range, .. } => {
                    is_array |= tokens[range.start].is("[");
                    is_function |= tokens[range.start].is("(");
                }
                _ => {}
            }
        }
        let range = node.range();
        let name = name.ok_or_else(|| ParseError {
            location: tokens[range.start].location,
            found: "declarator without a name".to_string(),
            expected: vec!["identifier".to_string()],
            attempted: vec!["Declarator"],
        })?;
        Ok(Declarator {
            name,
            is_array,
            is_function,
            init,
            line: tokens[range.start].line(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lexer::tokenize;

    fn declaration(source: &str) -> Declaration {
        let tokens = tokenize(source).unwrap();
        match Parser::new().parse_simple_statement(&tokens).unwrap() {
            SimpleStatement::Declaration(declaration) => declaration,
            other => panic!("expected a declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_multiple_declarators() {
        let decl = declaration("static const unsigned long *a, b[4], c = 3");

        let names: Vec<&str> = decl.declarators.iter().map(|d| &*d.name).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert!(decl.declarators[1].is_array);
        assert_eq!(decl.declarators[2].init.as_ref().unwrap().kind, ExprKind::Int(3));
    }

    #[test]
    fn test_struct_declaration_and_prototype() {
        let decl = declaration("struct pinctrl_dev *pctl = dev->priv");
        assert_eq!(&*decl.declarators[0].name, "pctl");

        let decl = declaration("struct foo { int a; int b; }");
        assert!(decl.declarators.is_empty());

        let decl = declaration("static int probe(struct device *dev)");
        assert!(decl.declarators[0].is_function);
    }

    #[test]
    fn test_enum_constants() {
        let decl = declaration("enum mode { IDLE, RUN = 4, STOP, }");

        let names: Vec<&str> = decl.enumerators.iter().map(|e| &*e.name).collect();
        assert_eq!(names, ["IDLE", "RUN", "STOP"]);
        assert!(decl.enumerators[0].value.is_none());
        assert_eq!(decl.enumerators[1].value.as_ref().unwrap().kind, ExprKind::Int(4));
    }

    #[test]
    fn test_expression_statements_are_not_declarations() {
        let tokens = tokenize("x = a * b").unwrap();
        assert!(matches!(
            Parser::new().parse_simple_statement(&tokens).unwrap(),
            SimpleStatement::Expression(_)
        ));
        let tokens = tokenize("typedef struct { int a; } foo_t").unwrap();
        assert_eq!(
            Parser::new().parse_simple_statement(&tokens).unwrap(),
            SimpleStatement::TypeOnly
        );
    }
}
