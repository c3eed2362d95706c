//! Expression evaluation
//!
//! Every value produced here carries the text and line of the expression
//! that produced it and the values it was computed from. Reading a variable
//! produces no new value: the stored value comes back with its own
//! provenance, which is what makes `x` explain as the expression that last
//! assigned it.

use crate::error::EvalError;
use crate::interpreter::engine::{Debugger, Evaluation, ExecState, Interpreter, RunToCompletion};
use crate::interpreter::errors::ExecError;
use crate::ir::Function;
use crate::lower::lower_snippet;
use crate::memory::{AllocId, Path, Payload, Provenance, Selector, ValueId};
use crate::parser::ast::{Designator, Expr, ExprKind, InitItem};
use crate::parser::lexer::{tokenize, Token};
use std::rc::Rc;
use tracing::debug;

/// What a name refers to
pub(crate) enum Binding {
    Variable(AllocId),
    Function(Rc<str>),
}

impl Interpreter {
    pub(crate) fn provenance(&self, expr: &Expr) -> Provenance {
        Provenance::new(expr.text.clone(), expr.line)
    }

    pub(crate) fn eval(&mut self, expr: &Expr, debugger: &mut dyn Debugger) -> Result<ValueId, ExecError> {
        match &expr.kind {
            ExprKind::Int(n) => Ok(self.trace.values.int(*n, self.provenance(expr))),
            ExprKind::Str(text) => Ok(self
                .trace
                .values
                .concrete(Payload::Str(text.clone()), self.provenance(expr))),
            ExprKind::Unrepresentable | ExprKind::Sizeof => {
                debug!(line = expr.line, text = &*expr.text, "value not modelled; result is opaque");
                Ok(self.trace.values.opaque(self.provenance(expr)))
            }
            ExprKind::Ident(name) => match self.resolve(name, expr.line)? {
                Binding::Variable(alloc) => Ok(self.trace.read(&Path::root(alloc), &self.provenance(expr))),
                Binding::Function(name) => Ok(self
                    .trace
                    .values
                    .concrete(Payload::Func(name), self.provenance(expr))),
            },
            ExprKind::Binary { op, lhs, rhs } => self.evaluate_binary(*op, lhs, rhs, expr, debugger),
            ExprKind::Unary { op, operand } => self.evaluate_unary(*op, operand, expr, debugger),
            ExprKind::Assign { target, value } => self.evaluate_assign(target, value, debugger),
            ExprKind::CompoundAssign { op, target, value } => {
                self.evaluate_compound_assign(*op, target, value, expr, debugger)
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                let cond = self.eval(cond, debugger)?;
                match self.trace.values.truthy(cond) {
                    Some(false) => self.eval(else_expr, debugger),
                    Some(true) | None => self.eval(then_expr, debugger),
                }
            }
            ExprKind::Call { callee, args } => self.evaluate_call(callee, args, expr, debugger),
            ExprKind::Member { base, field } if !base.is_place() => {
                let value = self.eval(base, debugger)?;
                let member = match self.trace.values.payload(value) {
                    Some(Payload::Aggregate(items)) => items
                        .iter()
                        .find(|(selector, _)| *selector == Selector::Field(field.clone()))
                        .map(|(_, item)| *item),
                    _ => None,
                };
                Ok(member.unwrap_or_else(|| self.trace.values.opaque(self.provenance(expr))))
            }
            ExprKind::Index { .. } | ExprKind::Member { .. } | ExprKind::PointerMember { .. } => {
                let path = self.place(expr, debugger)?;
                Ok(self.trace.read(&path, &self.provenance(expr)))
            }
            ExprKind::Cast(inner) => self.eval(inner, debugger),
            ExprKind::Comma(items) => {
                let mut last = None;
                for item in items {
                    last = Some(self.eval(item, debugger)?);
                }
                Ok(last.unwrap_or_else(|| self.trace.values.opaque(self.provenance(expr))))
            }
            ExprKind::InitList(items) => self.evaluate_init_list(items, expr, debugger),
        }
    }

    /// Look `name` up, creating it when it is unknown and names are not
    /// strict. Generated temporaries are always created on first use.
    pub(crate) fn resolve(&mut self, name: &Rc<str>, line: usize) -> Result<Binding, ExecError> {
        if let Some(alloc) = self.trace.lookup(name) {
            return Ok(Binding::Variable(alloc));
        }
        if self.unit.function(name).is_some() || self.natives.contains_key(name) {
            return Ok(Binding::Function(name.clone()));
        }
        if self.labels.is_generated(name) {
            return Ok(Binding::Variable(self.trace.bind(name)));
        }
        if self.config.strict_names {
            return Err(ExecError::UnboundName {
                name: name.to_string(),
                line,
            });
        }
        debug!(name = &**name, line, "unknown name; binding an opaque global");
        Ok(Binding::Variable(self.trace.bind_global(name)))
    }

    /// `{ ... }` in a fresh allocation. Lists made only of field designators
    /// are struct values and evaluate to an aggregate; any other list is an
    /// array and evaluates to a pointer to its first element.
    fn evaluate_init_list(
        &mut self,
        items: &[InitItem],
        expr: &Expr,
        debugger: &mut dyn Debugger,
    ) -> Result<ValueId, ExecError> {
        let alloc = self.trace.memory.allocate("initializer");
        let root = Path::root(alloc);
        let mut next = 0i64;
        let mut is_array = items.is_empty();
        for item in items {
            let value = self.eval(&item.value, debugger)?;
            let mut path = root.clone();
            if item.designators.is_empty() {
                is_array = true;
                path = path.child(Selector::Index(next));
                next += 1;
            }
            for (depth, designator) in item.designators.iter().enumerate() {
                match designator {
                    Designator::Field(field) => path = path.child(Selector::Field(field.clone())),
                    Designator::Index(index) => {
                        let index_value = self.eval(index, debugger)?;
                        let Some(k) = self.trace.values.as_int(index_value) else {
                            return Err(ExecError::UnsupportedOperator {
                                operator: "[]".to_string(),
                                detail: format!("designator '{}' is not a constant", index.text),
                                line: index.line,
                            });
                        };
                        if depth == 0 {
                            is_array = true;
                            next = k + 1;
                        }
                        path = path.child(Selector::Index(k));
                    }
                }
            }
            self.trace.write(&path, value);
        }
        if is_array {
            let first = root.child(Selector::Index(0));
            return Ok(self.trace.values.concrete(Payload::Ptr(first), self.provenance(expr)));
        }
        Ok(self.trace.read(&root, &self.provenance(expr)))
    }

    /// Evaluate C expression text in the current scope, as `xc` does.
    /// While an invocation is live the expression is attributed to the
    /// current line; otherwise lines count from the start of `text`.
    pub fn evaluate(&mut self, text: &str, debugger: &mut dyn Debugger) -> Result<Evaluation, EvalError> {
        let outer = std::mem::replace(&mut self.source, text.into());
        let result = self.evaluate_text(text, debugger);
        self.source = outer;
        result
    }

    fn evaluate_text(&mut self, text: &str, debugger: &mut dyn Debugger) -> Result<Evaluation, EvalError> {
        let tokens = self.snippet_tokens(text)?;
        let expr = self.parser.parse_expression(&tokens)?;
        let place = match &expr.kind {
            ExprKind::Ident(name) if !matches!(self.resolve(name, expr.line)?, Binding::Variable(_)) => None,
            _ if expr.is_place() => Some(self.place(&expr, debugger)?),
            _ => None,
        };
        let value = match &place {
            Some(path) => self.trace.read(path, &self.provenance(&expr)),
            None => self.eval(&expr, debugger)?,
        };
        Ok(Evaluation { value, place })
    }

    /// Evaluate expression text with `{0}`, `{1}`, ... standing for `args`
    /// (`{{` and `}}` for literal braces). Breakpoints are not honoured.
    pub fn eval_c(&mut self, text: &str, args: &[ValueId]) -> Result<ValueId, EvalError> {
        let (code, temporaries) = self.bind_placeholders(text, args)?;
        let result = self.evaluate(&code, &mut RunToCompletion).map(|e| e.value);
        self.unbind_all(&temporaries);
        result
    }

    /// Execute statement text with `{i}` placeholders in the current scope.
    /// Returns the value of a `return` statement, if one ran.
    pub fn exec_c(&mut self, text: &str, args: &[ValueId]) -> Result<Option<ValueId>, EvalError> {
        let (code, temporaries) = self.bind_placeholders(text, args)?;
        let result = self.run_snippet(&code);
        self.unbind_all(&temporaries);
        result
    }

    fn run_snippet(&mut self, code: &str) -> Result<Option<ValueId>, EvalError> {
        let line = self.live_line().unwrap_or(1);
        let body = lower_snippet(code, line, &self.parser, &mut self.labels)?;
        let snippet = Function::new("<snippet>".into(), Vec::new(), body, line, line).with_source(code.into());
        Ok(self.execute(&snippet, 0, &mut RunToCompletion)?)
    }

    fn snippet_tokens(&self, text: &str) -> Result<Vec<Token>, EvalError> {
        let mut tokens = tokenize(text)?;
        if let Some(line) = self.live_line() {
            for token in &mut tokens {
                token.location.line = line;
            }
        }
        Ok(tokens)
    }

    /// The line being executed, when an invocation is running or suspended
    fn live_line(&self) -> Option<usize> {
        match self.state() {
            ExecState::Running | ExecState::Suspended { .. } => Some(self.current_line.max(1)),
            ExecState::Ready | ExecState::Completed | ExecState::Faulted => None,
        }
    }

    /// Replace each `{i}` with a fresh temporary holding `args[i]`
    fn bind_placeholders(&mut self, text: &str, args: &[ValueId]) -> Result<(String, Vec<Rc<str>>), EvalError> {
        let mut code = String::with_capacity(text.len());
        let mut temporaries: Vec<(usize, Rc<str>)> = Vec::new();
        let mut chars = text.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    code.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    code.push('}');
                }
                '{' if chars.peek().is_some_and(|c| c.is_ascii_digit()) => {
                    let mut digits = String::new();
                    while let Some(d) = chars.peek().copied().filter(|c| c.is_ascii_digit()) {
                        digits.push(d);
                        chars.next();
                    }
                    if chars.peek() != Some(&'}') {
                        code.push('{');
                        code.push_str(&digits);
                        continue;
                    }
                    chars.next();
                    let index: usize = digits.parse().unwrap_or(usize::MAX);
                    if index >= args.len() {
                        return Err(EvalError::MissingArgument {
                            index,
                            given: args.len(),
                        });
                    }
                    let name = match temporaries.iter().find(|(i, _)| *i == index) {
                        Some((_, name)) => name.clone(),
                        None => {
                            let name = self.labels.fresh();
                            temporaries.push((index, name.clone()));
                            name
                        }
                    };
                    code.push(' ');
                    code.push_str(&name);
                    code.push(' ');
                }
                other => code.push(other),
            }
        }
        let mut names = Vec::with_capacity(temporaries.len());
        for (index, name) in temporaries {
            let alloc = self.trace.bind(&name);
            self.trace.write(&Path::root(alloc), args[index]);
            names.push(name);
        }
        Ok((code, names))
    }

    fn unbind_all(&mut self, names: &[Rc<str>]) {
        for name in names {
            self.trace.unbind(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SessionConfig;
    use crate::error::EvalError;
    use crate::interpreter::engine::{Interpreter, RunToCompletion};
    use crate::interpreter::errors::ExecError;

    fn interpreter(source: &str) -> Interpreter {
        let mut interp = Interpreter::new(source, SessionConfig::default()).unwrap();
        interp.run_globals(&mut RunToCompletion).unwrap();
        interp
    }

    fn int(interp: &mut Interpreter, text: &str) -> Option<i64> {
        let value = interp.evaluate(text, &mut RunToCompletion).unwrap().value;
        interp.trace.values.as_int(value)
    }

    #[test]
    fn test_globals_and_enums() {
        let mut interp = interpreter("enum { A, B = 5, C };\nint g = C * 2;\n");
        assert_eq!(int(&mut interp, "A"), Some(0));
        assert_eq!(int(&mut interp, "g"), Some(12));
    }

    #[test]
    fn test_arrays_and_pointers() {
        let source = "int a[3] = {1, 2, 3};\nint *p = a + 1;\nint s = 0;\n";
        let mut interp = interpreter(source);
        assert_eq!(int(&mut interp, "p[1]"), Some(3));
        assert_eq!(int(&mut interp, "*p"), Some(2));
        assert_eq!(int(&mut interp, "p - a"), Some(1));
        assert_eq!(int(&mut interp, "a[0] = 9"), Some(9));
        assert_eq!(int(&mut interp, "*a"), Some(9));
    }

    #[test]
    fn test_structs_copy_by_value() {
        let source = "struct pt { int x; int y; };\nstruct pt a = { .x = 1, .y = 2 };\nstruct pt b;\n";
        let mut interp = interpreter(source);
        interp.evaluate("b = a", &mut RunToCompletion).unwrap();
        interp.evaluate("a.x = 7", &mut RunToCompletion).unwrap();
        assert_eq!(int(&mut interp, "b.x"), Some(1));
        assert_eq!(int(&mut interp, "a.x + b.y"), Some(9));
    }

    #[test]
    fn test_strings_decay_to_char_cells() {
        let mut interp = interpreter("char *s = \"ok\";\n");
        assert_eq!(int(&mut interp, "s[1]"), Some('k' as i64));
        assert_eq!(int(&mut interp, "s[2]"), Some(0));
    }

    #[test]
    fn test_unknown_names_are_opaque_unless_strict() {
        let mut interp = interpreter("");
        let value = interp.evaluate("jiffies + 1", &mut RunToCompletion).unwrap().value;
        assert!(!interp.trace.values.is_concrete(value));

        let mut strict = Interpreter::new("", SessionConfig::default().with_strict_names(true)).unwrap();
        let err = strict.evaluate("jiffies", &mut RunToCompletion).unwrap_err();
        assert!(matches!(err, EvalError::Exec(ExecError::UnboundName { .. })));
    }

    #[test]
    fn test_eval_c_placeholders() {
        let mut interp = interpreter("int base = 40;\n");
        let two = interp.int(2, "2");
        let sum = interp.eval_c("base + {0}", &[two]).unwrap();
        assert_eq!(interp.trace.values.as_int(sum), Some(42));

        let err = interp.eval_c("{1}", &[two]).unwrap_err();
        assert!(matches!(err, EvalError::MissingArgument { index: 1, given: 1 }));
    }

    #[test]
    fn test_exec_c_runs_statements() {
        let mut interp = interpreter("int total = 0;\n");
        let four = interp.int(4, "4");
        let result = interp
            .exec_c("for (int i = 0; i < {0}; i++) total += i; return total;", &[four])
            .unwrap()
            .unwrap();
        assert_eq!(interp.trace.values.as_int(result), Some(6));
    }

    #[test]
    fn test_logical_operators_short_circuit() {
        let mut interp = interpreter("int hits = 0;\nint bump() { hits++; return 1; }\n");
        assert_eq!(int(&mut interp, "0 && bump()"), Some(0));
        assert_eq!(int(&mut interp, "1 || bump()"), Some(1));
        assert_eq!(int(&mut interp, "hits"), Some(0));
        assert_eq!(int(&mut interp, "1 && bump()"), Some(1));
        assert_eq!(int(&mut interp, "hits"), Some(1));
        assert_eq!(int(&mut interp, "hits ? 10 : 20"), Some(10));
    }

    #[test]
    fn test_errors_at_the_prompt_count_lines_from_the_snippet() {
        let mut interp = interpreter("int main()\n{\n  int x = 1;\n  return x;\n}\n");
        interp.invoke("main", &[], &mut RunToCompletion).unwrap();
        assert_eq!(interp.current_line(), 4);

        let err = interp.evaluate("x +", &mut RunToCompletion).unwrap_err();
        assert!(matches!(err, EvalError::Load(ref e) if e.location().map(|l| l.line) == Some(1)), "{}", err);
    }
}
