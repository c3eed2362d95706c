//! Lowered program representation
//!
//! After lowering, a function body is a flat list of instructions with only
//! three kinds of control transfer: `goto`, two-way `goto_ite`, and
//! `return`. Labels are resolved to instruction indices once, when the
//! function is built.

use crate::parser::ast::{Declaration, Expr};
use rustc_hash::FxHashMap;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum InstrKind {
    Declare(Declaration),
    Eval(Expr),
    Label(Rc<str>),
    Goto(Rc<str>),
    GotoIte {
        cond: Expr,
        then_label: Rc<str>,
        else_label: Rc<str>,
    },
    Return(Option<Expr>),
    Nop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub kind: InstrKind,
    pub line: usize,
}

impl Instr {
    pub fn new(kind: InstrKind, line: usize) -> Self {
        Self { kind, line }
    }

    /// Labels and no-ops do no work and never trigger breakpoints
    pub fn is_marker(&self) -> bool {
        matches!(self.kind, InstrKind::Label(_) | InstrKind::Nop)
    }

    /// Labels this instruction may jump to
    pub fn targets(&self) -> Vec<&Rc<str>> {
        match &self.kind {
            InstrKind::Goto(label) => vec![label],
            InstrKind::GotoIte {
                then_label,
                else_label,
                ..
            } => vec![then_label, else_label],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            InstrKind::Declare(decl) => {
                let names: Vec<&str> = decl
                    .enumerators
                    .iter()
                    .map(|e| &*e.name)
                    .chain(decl.declarators.iter().map(|d| &*d.name))
                    .collect();
                write!(f, "declare {}", names.join(", "))
            }
            InstrKind::Eval(expr) => write!(f, "{}", expr.text),
            InstrKind::Label(label) => write!(f, "{}:", label),
            InstrKind::Goto(label) => write!(f, "goto {}", label),
            InstrKind::GotoIte {
                cond,
                then_label,
                else_label,
            } => write!(f, "goto_ite ({}) {} {}", cond.text, then_label, else_label),
            InstrKind::Return(Some(expr)) => write!(f, "return {}", expr.text),
            InstrKind::Return(None) => write!(f, "return"),
            InstrKind::Nop => write!(f, "nop"),
        }
    }
}

/// A lowered function definition
#[derive(Debug, Clone)]
pub struct Function {
    pub name: Rc<str>,
    pub params: Vec<Rc<str>>,
    pub body: Vec<Instr>,
    pub start_line: usize,
    pub end_line: usize,
    /// Text the body was lexed from; expression spans index into it
    pub source: Rc<str>,
    labels: FxHashMap<Rc<str>, usize>,
}

impl Function {
    pub fn new(
        name: Rc<str>,
        params: Vec<Rc<str>>,
        body: Vec<Instr>,
        start_line: usize,
        end_line: usize,
    ) -> Self {
        let labels = body
            .iter()
            .enumerate()
            .filter_map(|(index, instr)| match &instr.kind {
                InstrKind::Label(label) => Some((label.clone(), index)),
                _ => None,
            })
            .collect();
        Self {
            name,
            params,
            body,
            start_line,
            end_line,
            source: "".into(),
            labels,
        }
    }

    pub fn with_source(mut self, source: Rc<str>) -> Self {
        self.source = source;
        self
    }

    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }

    /// Names declared anywhere in the body, in order of declaration
    pub fn declared_names(&self) -> Vec<Rc<str>> {
        let mut names: Vec<Rc<str>> = Vec::new();
        for instr in &self.body {
            let InstrKind::Declare(decl) = &instr.kind else {
                continue;
            };
            let declared = decl.enumerators.iter().map(|e| &e.name).chain(
                decl.declarators
                    .iter()
                    .filter(|d| !d.is_function)
                    .map(|d| &d.name),
            );
            for name in declared {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    pub fn contains_line(&self, line: usize) -> bool {
        (self.start_line..=self.end_line).contains(&line)
    }

    /// First instruction on the smallest line `>= line` that holds one
    pub fn entry_at_line(&self, line: usize) -> Option<usize> {
        let best = self
            .body
            .iter()
            .filter(|instr| !instr.is_marker() && instr.line >= line)
            .map(|instr| instr.line)
            .min()?;
        self.body
            .iter()
            .position(|instr| !instr.is_marker() && instr.line == best)
    }
}

/// Everything loaded from one source file
#[derive(Debug, Clone)]
pub struct TranslationUnit {
    pub source: Rc<str>,
    pub functions: FxHashMap<Rc<str>, Rc<Function>>,
    /// File-scope declarations, run by the globals pass
    pub globals: Rc<Function>,
}

impl TranslationUnit {
    pub fn function(&self, name: &str) -> Option<Rc<Function>> {
        self.functions.get(name).cloned()
    }

    /// The function whose definition spans `line`
    pub fn function_at_line(&self, line: usize) -> Option<Rc<Function>> {
        self.functions
            .values()
            .filter(|f| f.contains_line(line))
            .min_by_key(|f| f.end_line - f.start_line)
            .cloned()
    }

    /// Function names in source order
    pub fn function_names(&self) -> Vec<Rc<str>> {
        let mut functions: Vec<&Rc<Function>> = self.functions.values().collect();
        functions.sort_by_key(|f| f.start_line);
        functions.iter().map(|f| f.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::ExprKind;

    fn eval(line: usize) -> Instr {
        let expr = Expr {
            kind: ExprKind::Int(0),
            text: "0".into(),
            line,
            span: None,
        };
        Instr::new(InstrKind::Eval(expr), line)
    }

    #[test]
    fn test_labels_resolve_to_indices() {
        let body = vec![
            eval(2),
            Instr::new(InstrKind::Label("out".into()), 3),
            Instr::new(InstrKind::Return(None), 3),
        ];
        let function = Function::new("f".into(), Vec::new(), body, 1, 4);

        assert_eq!(function.label_index("out"), Some(1));
        assert_eq!(function.label_index("missing"), None);
    }

    #[test]
    fn test_entry_at_line_skips_to_next_instruction() {
        let body = vec![
            eval(2),
            Instr::new(InstrKind::Label("l".into()), 4),
            eval(5),
            eval(5),
        ];
        let function = Function::new("f".into(), Vec::new(), body, 1, 6);

        assert_eq!(function.entry_at_line(2), Some(0));
        assert_eq!(function.entry_at_line(3), Some(2));
        assert_eq!(function.entry_at_line(6), None);
    }
}
