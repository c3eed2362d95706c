//! Lowering of C source to labels and branches
//!
//! The statement loop parses one statement at a time with the control-flow
//! grammar. Structured constructs are rewritten in place (the rewrite output
//! is spliced over the construct's tokens and parsed again), so by the time
//! the loop advances past a statement it is one of the flat instruction
//! kinds of [`crate::ir`]. Short-circuit operators are lowered the same way:
//! a branch on `a && b` becomes two branches, and `&&`, `||` or `?:` nested
//! in any other statement is first hoisted into a generated temporary.

pub mod control;
pub mod macros;

use crate::error::LoadError;
use crate::ir::{Function, Instr, InstrKind, TranslationUnit};
use crate::parser::ast::{ParseNode, SimpleStatement};
use crate::parser::lexer::{tokenize, Token, TokenKind};
use crate::parser::Parser;
use crate::rewrite::{LabelGen, LabelMap, Origin, Rewrite, RewriteError};
use control::{ControlRules, ShortCircuit};
use rustc_hash::{FxHashMap, FxHashSet};
use std::ops::Range;
use std::rc::Rc;
use tracing::{debug, info};

/// Statements that give `break` a new meaning
const BREAK_SCOPES: &[&str] = &["while", "for", "do", "switch"];
/// Statements that give `continue` a new meaning
const CONTINUE_SCOPES: &[&str] = &["while", "for", "do"];

const GLOBALS: &str = "<globals>";

/// What the statement loop does next
enum Step {
    Emit(Instr),
    Skip(usize),
    Replace { range: Range<usize>, tokens: Vec<Token> },
}

pub struct Lowerer<'a> {
    parser: &'a Parser,
    labels: &'a mut LabelGen,
    source: &'a str,
    rules: ControlRules,
}

impl<'a> Lowerer<'a> {
    pub fn new(parser: &'a Parser, labels: &'a mut LabelGen, source: &'a str) -> Result<Self, LoadError> {
        Ok(Self {
            parser,
            labels,
            source,
            rules: ControlRules::new()?,
        })
    }

    /// Lower a statement list (a function body without its braces)
    pub fn lower_body(&mut self, mut tokens: Vec<Token>) -> Result<Vec<Instr>, LoadError> {
        let mut out = Vec::new();
        let mut pos = 0;
        while pos < tokens.len() {
            let node = self.parser.parse_statement(&tokens, pos)?;
            match self.lower_statement(&node, &tokens)? {
                Step::Emit(instr) => {
                    out.push(instr);
                    pos = node.range().end;
                }
                Step::Skip(next) => pos = next,
                Step::Replace { range, tokens: replacement } => {
                    tokens.splice(range, replacement);
                }
            }
        }
        Ok(out)
    }

    pub fn lower_function(&mut self, node: &ParseNode, tokens: &[Token]) -> Result<Function, LoadError> {
        let range = node.range();
        let children = node.children();
        let params_at = children
            .iter()
            .position(|c| matches!(c, ParseNode::Hole { .. }))
            .ok_or_else(|| structure("malformed function definition", &tokens[range.start]))?;
        let name = children[..params_at]
            .iter()
            .rev()
            .find_map(|c| match c {
                ParseNode::Terminal(i) if tokens[*i].kind == TokenKind::Ident => Some(tokens[*i].text.clone()),
                _ => None,
            })
            .ok_or_else(|| structure("function definition without a name", &tokens[range.start]))?;
        let params = split_top_level(&tokens[children[params_at].inner()])
            .into_iter()
            .filter_map(param_name)
            .collect();
        let body = children
            .last()
            .map(|c| tokens[c.inner()].to_vec())
            .unwrap_or_default();

        let instrs = self.lower_body(body)?;
        let function = Function::new(
            name,
            params,
            instrs,
            tokens[range.start].line(),
            tokens[range.end - 1].line(),
        );
        check_labels(&function)?;
        debug!(
            function = &*function.name,
            instructions = function.body.len(),
            "lowered function"
        );
        Ok(function)
    }

    fn lower_statement(&mut self, node: &ParseNode, tokens: &[Token]) -> Result<Step, LoadError> {
        let range = node.range();
        let first = &tokens[range.start];
        let line = first.line();
        match node.name().unwrap_or("Line") {
            "If" => {
                let has_else = node
                    .children()
                    .iter()
                    .any(|c| matches!(c, ParseNode::Terminal(i) if tokens[*i].is("else")));
                let rule = if has_else {
                    &self.rules.if_else
                } else {
                    &self.rules.if_then
                };
                let out = rule.apply(node, tokens, self.labels, self.source)?;
                Ok(Step::Replace { range, tokens: out })
            }
            "While" => self.lower_loop(node, tokens, LoopKind::While),
            "For" => self.lower_loop(node, tokens, LoopKind::For),
            "DoWhile" => self.lower_loop(node, tokens, LoopKind::DoWhile),
            "Switch" => self.lower_switch(node, tokens),
            "Case" => Err(structure("case label outside of a switch", first)),
            "Break" => Err(structure("'break' outside of a loop or switch", first)),
            "Continue" => Err(structure("'continue' outside of a loop", first)),
            "Function" => Err(structure("nested function definition", first)),
            "Block" => Ok(Step::Skip(range.start + 1)),
            "EndBlock" | "Preproc" => Ok(Step::Skip(range.end)),
            "Label" => Ok(Step::Emit(Instr::new(InstrKind::Label(first.text.clone()), line))),
            "Goto" => {
                let target = tokens[range.start + 1].text.clone();
                Ok(Step::Emit(Instr::new(InstrKind::Goto(target), line)))
            }
            "GotoIte" => self.lower_branch(node, tokens),
            "Return" => self.lower_return(node, tokens),
            _ => self.lower_line(node, tokens),
        }
    }

    fn lower_loop(&mut self, node: &ParseNode, tokens: &[Token], kind: LoopKind) -> Result<Step, LoadError> {
        let (rule, body_hole, break_label, continue_label) = match kind {
            LoopKind::While => (&self.rules.while_loop, 1, "lend", "lchk"),
            LoopKind::For => (&self.rules.for_loop, 3, "lend", "lupd"),
            LoopKind::DoWhile => (&self.rules.do_while, 0, "lend", "lchk"),
        };
        let mut holes = rule.bind(node, tokens)?;
        let labels = rule.template.fresh_labels(self.labels);
        if kind == LoopKind::For && holes[1].is_empty() {
            let at = &tokens[node.range().start];
            holes[1].push(synthetic(TokenKind::Number, "1", at));
        }
        let body = &mut holes[body_hole];
        retarget(self.parser, body, "break", &bound(rule, &labels, break_label)?, BREAK_SCOPES);
        retarget(
            self.parser,
            body,
            "continue",
            &bound(rule, &labels, continue_label)?,
            CONTINUE_SCOPES,
        );
        let out = rule.instantiate(node, tokens, &holes, &labels, self.source)?;
        Ok(Step::Replace {
            range: node.range(),
            tokens: out,
        })
    }

    /// `switch` becomes an assignment of the controlling value, one test per
    /// `case`, a jump to `default` (or past the end), then the body with its
    /// case labels turned into plain labels.
    fn lower_switch(&mut self, node: &ParseNode, tokens: &[Token]) -> Result<Step, LoadError> {
        let holes = self.rules.switch.bind(node, tokens)?;
        let mut body = holes[1].clone();
        let origin = Origin::of(tokens, node.range());

        let mut labels = LabelMap::default();
        labels.insert("val".into(), self.labels.fresh());
        let end = self.labels.fresh();
        labels.insert("lend".into(), end.clone());

        let cases = self.collect_cases(&mut body)?;
        retarget(self.parser, &mut body, "break", &end, BREAK_SCOPES);

        let mut out = self
            .rules
            .switch
            .template
            .instantiate(&holes[..1], &labels, &origin, self.source)?;
        let mut default = None;
        for (value, hit) in cases {
            let Some(value) = value else {
                default = Some(hit);
                continue;
            };
            let mut case_labels = labels.clone();
            case_labels.insert("hit".into(), hit);
            case_labels.insert("next".into(), self.labels.fresh());
            out.extend(
                self.rules
                    .switch_case
                    .instantiate(&[value], &case_labels, &origin, self.source)?,
            );
        }
        labels.insert("target".into(), default.unwrap_or(end));
        out.extend(
            self.rules
                .switch_dispatch
                .instantiate(&[body], &labels, &origin, self.source)?,
        );
        Ok(Step::Replace {
            range: node.range(),
            tokens: out,
        })
    }

    /// Replace the case labels of one switch body (not of nested switches)
    /// with fresh labels. Returns each case value (`None` for `default`)
    /// with its label, in source order.
    fn collect_cases(&mut self, body: &mut Vec<Token>) -> Result<Vec<(Option<Vec<Token>>, Rc<str>)>, LoadError> {
        let mut cases = Vec::new();
        let mut i = 0;
        while i < body.len() {
            if body[i].is("switch") {
                let nested = self.parser.parse_statement(body, i)?;
                i = nested.range().end.max(i + 1);
                continue;
            }
            if !(body[i].is("case") || body[i].is("default")) {
                i += 1;
                continue;
            }
            let node = self.parser.parse_statement(body, i)?;
            if !node.is_form("Case") {
                i += 1;
                continue;
            }
            let range = node.range();
            let value = body[i].is("case").then(|| body[i + 1..range.end - 1].to_vec());
            let hit = self.labels.fresh();
            let mut labels = LabelMap::default();
            labels.insert("hit".into(), hit.clone());
            let label = self.rules.case_label.instantiate(
                &[],
                &labels,
                &Origin::of(body, range.clone()),
                self.source,
            )?;
            i += label.len();
            body.splice(range, label);
            cases.push((value, hit));
        }
        Ok(cases)
    }

    fn lower_branch(&mut self, node: &ParseNode, tokens: &[Token]) -> Result<Step, LoadError> {
        let range = node.range();
        let children = node.children();
        let (Some(cond), Some(then_label), Some(else_label)) = (children.get(1), children.get(2), children.get(3)) else {
            return Err(structure("malformed goto_ite", &tokens[range.start]));
        };
        let then_label = tokens[then_label.range().start].clone();
        let else_label = tokens[else_label.range().start].clone();

        let tree = self.parser.expression_tree(tokens, cond.inner())?;
        let top = tree.unparenthesized();
        if let Some(kind) = ShortCircuit::of(top, tokens) {
            let rule = self.rules.branch(kind);
            let mut holes = rule.bind(top, tokens)?;
            holes.push(vec![then_label]);
            holes.push(vec![else_label]);
            let labels = rule.template.fresh_labels(self.labels);
            let out = rule.instantiate(node, tokens, &holes, &labels, self.source)?;
            return Ok(Step::Replace { range, tokens: out });
        }
        if let Some(inner) = find_short_circuit(&tree, tokens) {
            return self.hoist(node, inner, tokens);
        }
        let cond = self.parser.build_expr(&tree, tokens)?;
        Ok(Step::Emit(Instr::new(
            InstrKind::GotoIte {
                cond,
                then_label: then_label.text,
                else_label: else_label.text,
            },
            tokens[range.start].line(),
        )))
    }

    fn lower_return(&mut self, node: &ParseNode, tokens: &[Token]) -> Result<Step, LoadError> {
        let range = node.range();
        let line = tokens[range.start].line();
        let value = range.start + 1..range.end - 1;
        if value.is_empty() {
            return Ok(Step::Emit(Instr::new(InstrKind::Return(None), line)));
        }
        let tree = self.parser.expression_tree(tokens, value)?;
        if let Some(inner) = find_short_circuit(&tree, tokens) {
            return self.hoist(node, inner, tokens);
        }
        let expr = self.parser.build_expr(&tree, tokens)?;
        Ok(Step::Emit(Instr::new(InstrKind::Return(Some(expr)), line)))
    }

    fn lower_line(&mut self, node: &ParseNode, tokens: &[Token]) -> Result<Step, LoadError> {
        let range = node.range();
        let line = tokens[range.start].line();
        let body = range.start..range.end - 1;
        let tree = self.parser.simple_statement_tree(tokens, body.clone())?;
        let top = single(&tree);

        if top.is_form("Assign") {
            let op = match top.children().get(1) {
                Some(ParseNode::Terminal(i)) => tokens[*i].text.clone(),
                _ => "=".into(),
            };
            if let Some(rule) = self.rules.compound(&op) {
                let holes = rule.bind(top, tokens)?;
                let out = rule.instantiate(top, tokens, &holes, &LabelMap::default(), self.source)?;
                return Ok(Step::Replace {
                    range: body,
                    tokens: out,
                });
            }
            if let Some(step) = self.assign_to_temp(node, top, tokens)? {
                return Ok(step);
            }
        }
        if let Some(inner) = find_short_circuit(&tree, tokens) {
            return self.hoist(node, inner, tokens);
        }
        let kind = match self.parser.build_simple_statement(&tree, tokens)? {
            SimpleStatement::Empty | SimpleStatement::TypeOnly => InstrKind::Nop,
            SimpleStatement::Declaration(decl) => InstrKind::Declare(decl),
            SimpleStatement::Expression(expr) => InstrKind::Eval(expr),
        };
        Ok(Step::Emit(Instr::new(kind, line)))
    }

    /// `tmp = a && b;` (and `||`, `?:`) where `tmp` is a generated name
    fn assign_to_temp(
        &mut self,
        statement: &ParseNode,
        assign: &ParseNode,
        tokens: &[Token],
    ) -> Result<Option<Step>, LoadError> {
        let (Some(ParseNode::Terminal(target)), Some(value)) = (assign.children().first(), assign.children().get(2))
        else {
            return Ok(None);
        };
        if !self.labels.is_generated(&tokens[*target].text) {
            return Ok(None);
        }
        let value = value.unparenthesized();
        let Some(kind) = ShortCircuit::of(value, tokens) else {
            return Ok(None);
        };
        let rule = self.rules.assign_to_temp(kind);
        let mut holes = vec![vec![tokens[*target].clone()]];
        holes.extend(rule.bind(value, tokens)?);
        let labels = rule.template.fresh_labels(self.labels);
        let out = rule.instantiate(statement, tokens, &holes, &labels, self.source)?;
        Ok(Some(Step::Replace {
            range: statement.range(),
            tokens: out,
        }))
    }

    /// Move `inner` out of `statement` into a fresh temporary assigned just
    /// before it
    fn hoist(&mut self, statement: &ParseNode, inner: &ParseNode, tokens: &[Token]) -> Result<Step, LoadError> {
        let range = statement.range();
        let sub = inner.range();
        let holes = vec![
            tokens[range.start..sub.start].to_vec(),
            tokens[sub.clone()].to_vec(),
            tokens[sub.end..range.end].to_vec(),
        ];
        let template = &self.rules.hoist;
        let labels = template.fresh_labels(self.labels);
        let out = template.instantiate(&holes, &labels, &Origin::of(tokens, range.clone()), self.source)?;
        debug!(line = tokens[sub.start].line(), "hoisted short-circuit expression");
        Ok(Step::Replace { range, tokens: out })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopKind {
    While,
    For,
    DoWhile,
}

/// Load a whole source file
pub fn load(source: &str, parser: &Parser, labels: &mut LabelGen) -> Result<TranslationUnit, LoadError> {
    let tokens = macros::expand_macros(tokenize(source)?, source)?;
    let mut lowerer = Lowerer::new(parser, labels, source)?;
    let text: Rc<str> = source.into();
    let mut functions = FxHashMap::default();
    let mut globals = Vec::new();
    let mut pos = 0;
    while pos < tokens.len() {
        let node = parser.parse_statement(&tokens, pos)?;
        let range = node.range();
        if node.is_form("Function") {
            let function = lowerer.lower_function(&node, &tokens)?.with_source(text.clone());
            functions.insert(function.name.clone(), Rc::new(function));
        } else {
            globals.extend_from_slice(&tokens[range.clone()]);
        }
        pos = range.end;
    }
    let end_line = tokens.last().map(|t| t.line()).unwrap_or(1);
    let body = lowerer.lower_body(globals)?;
    let globals = Function::new(GLOBALS.into(), Vec::new(), body, 1, end_line).with_source(text.clone());
    check_labels(&globals)?;

    info!(functions = functions.len(), "loaded translation unit");
    Ok(TranslationUnit {
        source: text,
        functions,
        globals: Rc::new(globals),
    })
}

/// Lower a free-standing statement list, as typed at the shell. The first
/// line of `code` is numbered `first_line`.
pub fn lower_snippet(
    code: &str,
    first_line: usize,
    parser: &Parser,
    labels: &mut LabelGen,
) -> Result<Vec<Instr>, LoadError> {
    let mut tokens = tokenize(code)?;
    for token in &mut tokens {
        token.location.line += first_line.saturating_sub(1);
    }
    let mut lowerer = Lowerer::new(parser, labels, code)?;
    let body = lowerer.lower_body(tokens)?;
    let snippet = Function::new("<snippet>".into(), Vec::new(), body, first_line, first_line);
    check_labels(&snippet)?;
    Ok(snippet.body)
}

/// Every goto target must be a label of the same function
fn check_labels(function: &Function) -> Result<(), LoadError> {
    let defined: FxHashSet<&str> = function
        .body
        .iter()
        .filter_map(|instr| match &instr.kind {
            InstrKind::Label(label) => Some(&**label),
            _ => None,
        })
        .collect();
    for instr in &function.body {
        if let Some(missing) = instr.targets().into_iter().find(|t| !defined.contains(&***t)) {
            return Err(LoadError::UndefinedLabel {
                label: missing.to_string(),
                function: function.name.to_string(),
                line: instr.line,
            });
        }
    }
    Ok(())
}

/// Rewrite `keyword ;` into `goto target ;`, leaving nested constructs that
/// rebind the keyword alone
fn retarget(parser: &Parser, tokens: &mut Vec<Token>, keyword: &str, target: &Rc<str>, scopes: &[&str]) {
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i].is(keyword) && tokens.get(i + 1).is_some_and(|t| t.is(";")) {
            let jump = [
                synthetic(TokenKind::Ident, "goto", &tokens[i]),
                synthetic(TokenKind::Ident, target, &tokens[i]),
            ];
            tokens.splice(i..i + 1, jump);
            i += 3;
        } else if scopes.iter().any(|s| tokens[i].is(s)) {
            i = match parser.parse_statement(tokens, i) {
                Ok(node) => node.range().end.max(i + 1),
                Err(_) => i + 1,
            };
        } else {
            i += 1;
        }
    }
}

fn synthetic(kind: TokenKind, text: &str, at: &Token) -> Token {
    let mut token = Token::new(kind, text, at.location, at.span);
    token.synthetic = true;
    token
}

fn bound(rule: &Rewrite, labels: &LabelMap, name: &str) -> Result<Rc<str>, RewriteError> {
    labels
        .get(name)
        .cloned()
        .ok_or_else(|| RewriteError::UnboundLabel {
            template: rule.template.text().to_string(),
            label: name.to_string(),
        })
}

fn structure(message: &str, at: &Token) -> LoadError {
    LoadError::Structure {
        message: message.to_string(),
        location: at.location,
    }
}

/// Descend through wrapper sequences to the node that does the work
fn single(node: &ParseNode) -> &ParseNode {
    match node {
        ParseNode::Sequence { children, .. } if children.len() == 1 => single(&children[0]),
        other => other,
    }
}

fn find_short_circuit<'n>(tree: &'n ParseNode, tokens: &[Token]) -> Option<&'n ParseNode> {
    tree.find(&|node| ShortCircuit::of(node, tokens).is_some())
}

/// Split a parameter or argument list on commas outside brackets
fn split_top_level(tokens: &[Token]) -> Vec<&[Token]> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Punct {
            continue;
        }
        match &*token.text {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => depth -= 1,
            "," if depth == 0 => {
                parts.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < tokens.len() {
        parts.push(&tokens[start..]);
    }
    parts
}

/// Declared name of one parameter; `None` for `void` and `...`
fn param_name(param: &[Token]) -> Option<Rc<str>> {
    if let Some(open) = param.iter().position(|t| t.is("(")) {
        if param.get(open + 1).is_some_and(|t| t.is("*")) {
            return param[open + 2..]
                .iter()
                .find(|t| t.kind == TokenKind::Ident)
                .map(|t| t.text.clone());
        }
    }
    let cut = param.iter().position(|t| t.is("[")).unwrap_or(param.len());
    match &param[..cut] {
        [only] if only.is("void") => None,
        head => head
            .iter()
            .rev()
            .find(|t| t.kind == TokenKind::Ident)
            .map(|t| t.text.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lexer::join_text;

    fn lower(code: &str) -> Vec<String> {
        let parser = Parser::new();
        let mut labels = LabelGen::new("L");
        lower_snippet(code, 1, &parser, &mut labels)
            .unwrap()
            .iter()
            .map(|i| i.to_string())
            .collect()
    }

    fn is_flat(instr: &str) -> bool {
        !["if", "while", "for", "do", "switch", "break", "continue", "&&", "||", "?"]
            .iter()
            .any(|word| instr.split(' ').any(|w| w == *word))
    }

    #[test]
    fn test_if_else_becomes_branch() {
        let instrs = lower("if (x > 1) y = 1; else y = 2;");
        assert_eq!(
            instrs,
            [
                "goto_ite (x > 1) L0 L1",
                "L0:",
                "y = 1",
                "goto L2",
                "L1:",
                "y = 2",
                "L2:",
                "nop",
            ]
        );
    }

    #[test]
    fn test_while_loop_shape() {
        let instrs = lower("while (i < 3) { i++; }");
        assert_eq!(
            instrs,
            [
                "L0:",
                "goto_ite (i < 3) L2 L3",
                "L2:",
                "i ++",
                "goto L0",
                "L3:",
                "nop",
                "L1:",
                "nop",
            ]
        );
    }

    #[test]
    fn test_break_and_continue_target_their_loop() {
        let code = "for (i = 0; i < 9; i++) { if (i == 2) continue; while (1) { break; } break; }";
        let instrs = lower(code);
        assert!(instrs.iter().all(|i| is_flat(i)));
        // the continue jumps to the update label, the outer break to the end
        let update = instrs.iter().position(|i| i == "L1:").unwrap();
        assert_eq!(instrs[update + 1], "i ++");
        assert!(instrs.contains(&"goto L1".to_string()));
        assert!(instrs.contains(&"goto L3".to_string()));
    }

    #[test]
    fn test_for_without_condition_loops_forever() {
        let instrs = lower("for (;;) { f(); }");
        assert!(instrs.iter().any(|i| i.starts_with("goto_ite (1)")));
    }

    #[test]
    fn test_do_while_and_switch_are_flattened() {
        let code = "do { switch (k) { case 1: a = 1; break; case 2: default: a = 2; } } while (a < 0);";
        let instrs = lower(code);
        assert!(instrs.iter().all(|i| is_flat(i)), "{:?}", instrs);
        assert!(instrs.iter().any(|i| i.contains("== ( 1 )")));
        assert!(instrs.iter().any(|i| i.contains("== ( 2 )")));
    }

    #[test]
    fn test_short_circuit_branch_splits() {
        let instrs = lower("if (a && b) x = 1;");
        assert_eq!(instrs[0], "goto_ite (a) L2 L1");
        assert_eq!(instrs[1], "L2:");
        assert_eq!(instrs[2], "goto_ite (b) L0 L1");
    }

    #[test]
    fn test_nested_short_circuit_is_hoisted() {
        let instrs = lower("y = 1 + (a || b);");
        assert!(instrs.iter().all(|i| is_flat(i)), "{:?}", instrs);
        assert_eq!(instrs[0], "L0 = 1");
        assert_eq!(instrs.last().map(String::as_str), Some("y = 1 + ( L0 )"));
    }

    #[test]
    fn test_compound_assignment_expands() {
        assert_eq!(lower("x += 2;"), ["( x ) = ( ( x ) + ( 2 ) )"]);
    }

    #[test]
    fn test_stray_break_is_an_error() {
        let parser = Parser::new();
        let mut labels = LabelGen::new("L");
        let err = lower_snippet("x = 1;\nbreak;", 1, &parser, &mut labels).unwrap_err();
        assert!(matches!(err, LoadError::Structure { location, .. } if location.line == 2));
    }

    #[test]
    fn test_undefined_goto_target_is_an_error() {
        let parser = Parser::new();
        let mut labels = LabelGen::new("L");
        let err = lower_snippet("goto nowhere;", 1, &parser, &mut labels).unwrap_err();
        assert!(matches!(err, LoadError::UndefinedLabel { .. }));
    }

    #[test]
    fn test_load_splits_functions_and_globals() {
        let source = "int g = 4;\nint add(int a, int *b) {\n  return a + *b;\n}\nstruct pt { int x; };\n";
        let parser = Parser::new();
        let mut labels = LabelGen::new("L");
        let unit = load(source, &parser, &mut labels).unwrap();

        let add = unit.function("add").unwrap();
        assert_eq!(add.params, [Rc::from("a"), Rc::from("b")]);
        assert_eq!((add.start_line, add.end_line), (2, 4));
        assert_eq!(add.body.len(), 1);
        assert_eq!(unit.globals.body.len(), 2);
        assert_eq!(unit.function_at_line(3).map(|f| f.name.clone()), Some("add".into()));
    }

    #[test]
    fn test_param_names() {
        let names = |src: &str| {
            let tokens = tokenize(src).unwrap();
            split_top_level(&tokens)
                .into_iter()
                .filter_map(param_name)
                .map(|n| n.to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(names("void"), Vec::<String>::new());
        assert_eq!(names("int a[], char **argv"), ["a", "argv"]);
        assert_eq!(names("int (*cb)(int, int), const struct s *p"), ["cb", "p"]);
        assert_eq!(join_text(&tokenize("a , b").unwrap()), "a , b");
    }
}
