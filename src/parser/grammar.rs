//! Control-flow grammar
//!
//! Recognizes one statement at a time. Everything that is not structured
//! control flow (declarations, expressions) is a `Line` whose content is a
//! hole up to the next `;`. Conditions and bodies are holes as well, so
//! statements parse without knowing anything about C types.

use super::lexer::TokenKind;
use super::peg::*;

/// Names that never start a function definition
const STATEMENT_KEYWORDS: &[&str] = &[
    "if", "else", "while", "do", "for", "switch", "case", "default", "return", "goto", "break",
    "continue", "goto_ite",
];

fn keyword(text: &'static str) -> Rule {
    lit(text)
}

/// `{ ... }` or a single statement
fn body() -> Rule {
    choice([rule("Block"), rule("Statement")])
}

pub fn control_flow_grammar() -> Grammar {
    let mut grammar = Grammar::new("control-flow");
    grammar
        .define(
            "Statement",
            choice([
                rule("If"),
                rule("DoWhile"),
                rule("While"),
                rule("For"),
                rule("Switch"),
                rule("Case"),
                rule("Label"),
                rule("Goto"),
                rule("GotoIte"),
                rule("Break"),
                rule("Continue"),
                rule("Return"),
                rule("Function"),
                rule("Block"),
                rule("EndBlock"),
                rule("Preproc"),
                rule("Line"),
            ]),
        )
        .define(
            "If",
            form(
                "If",
                sequence([
                    keyword("if"),
                    balanced("(", ")"),
                    body(),
                    optional(sequence([keyword("else"), body()])),
                ]),
            ),
        )
        .define(
            "DoWhile",
            form(
                "DoWhile",
                sequence([
                    keyword("do"),
                    body(),
                    keyword("while"),
                    balanced("(", ")"),
                    lit(";"),
                ]),
            ),
        )
        .define(
            "While",
            form("While", sequence([keyword("while"), balanced("(", ")"), body()])),
        )
        .define(
            "For",
            form("For", sequence([keyword("for"), balanced("(", ")"), body()])),
        )
        .define(
            "Switch",
            form("Switch", sequence([keyword("switch"), balanced("(", ")"), body()])),
        )
        .define(
            "Case",
            form(
                "Case",
                choice([
                    sequence([keyword("case"), skip_to(lit(":"))]),
                    sequence([keyword("default"), lit(":")]),
                ]),
            ),
        )
        .define(
            "Label",
            form(
                "Label",
                sequence([
                    not(one_of(STATEMENT_KEYWORDS)),
                    kind(TokenKind::Ident),
                    lit(":"),
                ]),
            ),
        )
        .define(
            "Goto",
            form("Goto", sequence([keyword("goto"), kind(TokenKind::Ident), lit(";")])),
        )
        .define(
            "GotoIte",
            form(
                "GotoIte",
                sequence([
                    keyword("goto_ite"),
                    balanced("(", ")"),
                    kind(TokenKind::Ident),
                    kind(TokenKind::Ident),
                    lit(";"),
                ]),
            ),
        )
        .define("Break", form("Break", sequence([keyword("break"), lit(";")])))
        .define(
            "Continue",
            form("Continue", sequence([keyword("continue"), lit(";")])),
        )
        .define(
            "Return",
            form("Return", sequence([keyword("return"), skip_to(lit(";"))])),
        )
        .define(
            "Function",
            form(
                "Function",
                sequence([
                    not(one_of(STATEMENT_KEYWORDS)),
                    repeat1(choice([kind(TokenKind::Ident), lit("*")])),
                    balanced("(", ")"),
                    repeat(kind(TokenKind::Ident)),
                    balanced("{", "}"),
                ]),
            ),
        )
        .define("Block", form("Block", balanced("{", "}")))
        .define("EndBlock", form("EndBlock", lit("}")))
        .define("Preproc", form("Preproc", kind(TokenKind::Preproc)))
        .define("Line", form("Line", skip_to(lit(";"))));
    grammar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::ParseNode;
    use crate::parser::lexer::tokenize;

    fn statement(source: &str) -> (ParseNode, usize) {
        let tokens = tokenize(source).unwrap();
        control_flow_grammar()
            .parse("Statement", &tokens, 0)
            .unwrap()
    }

    #[test]
    fn test_if_else_with_single_statement_bodies() {
        let (node, end) = statement("if (a) x = 1; else { y = 2; } z;");

        assert!(node.is_form("If"));
        assert_eq!(end, 15);
        let children = node.children();
        assert!(children[2].is_form("Line"));
        assert!(children[4].is_form("Block"));
    }

    #[test]
    fn test_do_while_wins_over_while() {
        let (node, _) = statement("do { i++; } while (i < 3);");
        assert!(node.is_form("DoWhile"));
    }

    #[test]
    fn test_label_versus_default_case() {
        assert!(statement("out: return 0;").0.is_form("Label"));
        assert!(statement("default: x;").0.is_form("Case"));
        assert!(statement("case A + 1: x;").0.is_form("Case"));
    }

    #[test]
    fn test_function_definition_versus_prototype() {
        let (node, _) = statement("static int *f(int a, char **b) { return a; }");
        assert!(node.is_form("Function"));

        let (node, _) = statement("int f(int a);");
        assert!(node.is_form("Line"));
    }

    #[test]
    fn test_goto_ite_and_return() {
        assert!(statement("goto_ite (x > 1) l1 l2;").0.is_form("GotoIte"));
        let (node, end) = statement("return;");
        assert!(node.is_form("Return"));
        assert_eq!(end, 2);
    }

    #[test]
    fn test_unterminated_line_reports_error() {
        let tokens = tokenize("x = 1").unwrap();
        let err = control_flow_grammar()
            .parse("Statement", &tokens, 0)
            .unwrap_err();
        assert!(err.expected.contains(&"';'".to_string()));
        assert!(err.attempted.contains(&"Line"));
    }
}
