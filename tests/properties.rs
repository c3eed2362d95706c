// Property tests for balanced spans, rewrite holes, opacity, arithmetic and breakpoints

use proptest::prelude::*;
use ssi::interpreter::ops::{binary, integer};
use ssi::interpreter::{Breakpoints, Interpreter, RunToCompletion};
use ssi::memory::{Provenance, ValueStore};
use ssi::parser::ast::BinOp;
use ssi::parser::lexer::{reconstruct, tokenize};
use ssi::parser::peg::find_balance;
use ssi::parser::Parser;
use ssi::rewrite::Rewrite;
use ssi::SessionConfig;

const OPS: &[BinOp] = &[
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
    BinOp::BitAnd,
    BinOp::BitOr,
    BinOp::BitXor,
    BinOp::BitShl,
    BinOp::BitShr,
];

fn op() -> impl Strategy<Value = BinOp> {
    prop::sample::select(OPS)
}

/// Space-separated token text with balanced brackets
fn balanced_text() -> impl Strategy<Value = String> {
    let leaf = prop::sample::select(vec!["a", "1", "+", "x", "*", ",", "0x1f", "\"s\""]).prop_map(str::to_string);
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(|parts| format!("( {} )", parts.join(" "))),
            prop::collection::vec(inner.clone(), 0..4).prop_map(|parts| format!("[ {} ]", parts.join(" "))),
            prop::collection::vec(inner, 1..4).prop_map(|parts| parts.join(" ")),
        ]
    })
}

/// Anything the lexer skips between two tokens
fn gap() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![" ", "  ", "\n", "\t", " /* note */ ", "\n    ", " // trailing\n"])
}

/// Balanced token sequence with assorted whitespace and comments between
/// tokens. Never starts or ends with a gap.
fn spaced_text() -> impl Strategy<Value = String> {
    let leaf = prop::sample::select(vec!["a", "1", "+", "x", "*", ",", "0x1f", "\"s\""]).prop_map(|t| vec![t.to_string()]);
    let tokens = leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(|parts| {
                let mut out = vec!["(".to_string()];
                out.extend(parts.into_iter().flatten());
                out.push(")".to_string());
                out
            }),
            prop::collection::vec(inner, 1..4).prop_map(|parts| parts.into_iter().flatten().collect()),
        ]
    });
    tokens
        .prop_flat_map(|tokens| {
            let gaps = prop::collection::vec(gap(), tokens.len());
            (Just(tokens), gaps)
        })
        .prop_map(|(tokens, gaps)| {
            let mut text = String::new();
            for (i, token) in tokens.iter().enumerate() {
                if i > 0 {
                    text.push_str(gaps[i]);
                }
                text.push_str(token);
            }
            text
        })
}

/// A statement that starts and ends with a token
fn statement() -> impl Strategy<Value = String> {
    (spaced_text(), gap(), any::<bool>()).prop_map(|(inner, space, block)| {
        if block {
            format!("{{{}y = ({});{}}}", space, inner, space)
        } else {
            format!("run({}){};", inner, space)
        }
    })
}

proptest! {
    #[test]
    fn unchanged_holes_reproduce_their_source(
        cond in spaced_text(),
        body in statement(),
        gaps in prop::collection::vec(gap(), 4),
    ) {
        let source = format!("if{}({}{}{}){}{}", gaps[0], gaps[1], cond, gaps[2], gaps[3], body);
        let tokens = tokenize(&source).unwrap();
        let node = Parser::new().parse_statement(&tokens, 0).unwrap();

        let holes = Rewrite::new("if ( ... ) ...", "{0} {1}").unwrap().bind(&node, &tokens).unwrap();

        prop_assert_eq!(holes.len(), 2);
        prop_assert_eq!(reconstruct(&holes[0], &source), cond);
        prop_assert_eq!(reconstruct(&holes[1], &source), body);
    }

    #[test]
    fn balanced_span_reconstructs_its_source(body in balanced_text()) {
        let source = format!("f({});", body);
        let tokens = tokenize(&source).unwrap();

        let close = find_balance(&tokens, 1, "(", ")");

        prop_assert_eq!(close, Some(tokens.len() - 2));
        prop_assert_eq!(reconstruct(&tokens[2..tokens.len() - 2], &source), body);
    }

    #[test]
    fn opaque_operand_makes_result_opaque(op in op(), n in any::<i64>(), opaque_left in any::<bool>()) {
        let mut values = ValueStore::new();
        let known = values.int(n, Provenance::new("n", 1));
        let unknown = values.opaque(Provenance::new("u", 1));
        let (lhs, rhs) = if opaque_left { (unknown, known) } else { (known, unknown) };

        let result = binary(&mut values, op, lhs, rhs, Provenance::new("e", 1)).unwrap();

        prop_assert!(!values.is_concrete(result));
    }

    #[test]
    fn concrete_operands_give_the_native_result(op in op(), a in -1000i64..1000, b in -1000i64..1000) {
        let mut values = ValueStore::new();
        let lhs = values.int(a, Provenance::new("a", 1));
        let rhs = values.int(b, Provenance::new("b", 1));

        let result = binary(&mut values, op, lhs, rhs, Provenance::new("e", 1)).unwrap();

        match integer(op, a, b) {
            Some(expected) => prop_assert_eq!(values.as_int(result), Some(expected)),
            None => prop_assert!(!values.is_concrete(result)),
        }
    }

    #[test]
    fn setting_a_breakpoint_twice_equals_once(lines in prop::collection::vec(1usize..50, 0..20)) {
        let mut once = Breakpoints::default();
        let mut twice = Breakpoints::default();
        for line in &lines {
            once.add(*line);
            twice.add(*line);
            twice.add(*line);
        }
        prop_assert_eq!(once.sorted(), twice.sorted());
    }

    #[test]
    fn expression_values_match_native_arithmetic(a in -100i64..100, b in 1i64..100) {
        let mut interp = Interpreter::new("", SessionConfig::default()).unwrap();
        let text = format!("({a} * 3 + {b}) % {b} - ({a} << 2)");
        let value = interp.evaluate(&text, &mut RunToCompletion).unwrap().value;
        prop_assert_eq!(interp.trace.values.as_int(value), Some((a * 3 + b) % b - (a << 2)));
    }
}
