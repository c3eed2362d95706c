// Function calls: native interception, verbose tracing and C bodies

use crate::interpreter::engine::{ArgFormat, Debugger, Interpreter, NativeMode};
use crate::interpreter::errors::ExecError;
use crate::ir::Function;
use crate::memory::{Path, Payload, Provenance, ValueId};
use crate::parser::ast::{Expr, ExprKind, UnOp};
use std::rc::Rc;
use tracing::debug;

/// What a call expression names
enum Callee {
    Named(Rc<str>),
    /// A function pointer whose target is unknown
    Unknown,
}

impl Interpreter {
    pub(crate) fn evaluate_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        expr: &Expr,
        debugger: &mut dyn Debugger,
    ) -> Result<ValueId, ExecError> {
        let target = self.callee(callee, debugger)?;
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let value = self.eval(arg, debugger)?;
            self.decay(value);
            values.push(value);
        }
        match target {
            Callee::Named(name) => {
                let shown = self.source_text(expr);
                self.trace_call(&name, &values, &shown, expr.line);
                self.call(&name, &values, &expr.text, expr.line, debugger)
            }
            Callee::Unknown => {
                debug!(line = expr.line, text = &*expr.text, "call through an opaque pointer");
                Ok(self.trace.values.opaque(self.provenance(expr).with_operands(values)))
            }
        }
    }

    fn callee(&mut self, callee: &Expr, debugger: &mut dyn Debugger) -> Result<Callee, ExecError> {
        // `(*fp)(...)` calls what `fp` points to
        let callee = match &callee.kind {
            ExprKind::Unary {
                op: UnOp::Deref,
                operand,
            } => operand.as_ref(),
            _ => callee,
        };
        // a name with no variable behind it is called by name, so unknown
        // functions can be intercepted or reported
        if let ExprKind::Ident(name) = &callee.kind {
            if self.trace.lookup(name).is_none() {
                return Ok(Callee::Named(name.clone()));
            }
        }
        let value = self.eval(callee, debugger)?;
        match self.trace.values.payload(value) {
            Some(Payload::Func(name)) => Ok(Callee::Named(name.clone())),
            Some(_) => Err(ExecError::UnsupportedOperator {
                operator: "()".to_string(),
                detail: format!("'{}' is not a function", callee.text),
                line: callee.line,
            }),
            None => Ok(Callee::Unknown),
        }
    }

    /// Print the call and its arguments if `name` is registered as verbose
    pub(crate) fn trace_call(&mut self, name: &str, args: &[ValueId], shown: &str, line: usize) {
        if let Some(formats) = self.verbose.get(name) {
            let rendered = self.format_args(formats, args);
            self.console.println(format!("Line {}: {} => {}", line, shown, rendered), line);
        }
    }

    /// Dispatch a call to `name` with evaluated arguments. `text` is the
    /// explanation text of the call's result.
    pub(crate) fn call(
        &mut self,
        name: &Rc<str>,
        args: &[ValueId],
        text: &str,
        line: usize,
        debugger: &mut dyn Debugger,
    ) -> Result<ValueId, ExecError> {
        let function = self.unit.function(name);
        debug!(function = &**name, line, args = args.len(), native = self.natives.contains_key(name), "call");

        if let Some(native) = self.natives.get(name).cloned() {
            let result = (native.handler)(self, args)?;
            match (native.mode, &function) {
                (NativeMode::Replace, _) | (NativeMode::Observe, None) => return Ok(result),
                (NativeMode::Observe, Some(_)) => {}
            }
        }
        if let Some(function) = function {
            let returned = self.call_function(&function, args, line, debugger)?;
            return Ok(match returned {
                Some(value) => value,
                None => self.trace.values.opaque(Provenance::new(text, line)),
            });
        }
        if self.config.strict_names {
            return Err(ExecError::UnboundName {
                name: name.to_string(),
                line,
            });
        }
        debug!(function = &**name, line, "no body for function; result is opaque");
        Ok(self
            .trace
            .values
            .opaque(Provenance::new(text, line).with_operands(args.to_vec())))
    }

    /// Run a C body in a new scope with the parameters bound to `args`.
    /// Parameters without an argument read as opaque.
    fn call_function(
        &mut self,
        function: &Function,
        args: &[ValueId],
        line: usize,
        debugger: &mut dyn Debugger,
    ) -> Result<Option<ValueId>, ExecError> {
        self.enter_frame(function, line)?;
        for (i, param) in function.params.iter().enumerate() {
            let alloc = self.trace.bind(param);
            if let Some(arg) = args.get(i) {
                self.trace.write(&Path::root(alloc), *arg);
            }
        }
        let result = self.execute(function, 0, debugger);
        self.leave_frame();
        result
    }

    fn format_args(&self, formats: &[ArgFormat], args: &[ValueId]) -> String {
        args.iter()
            .enumerate()
            .map(|(i, arg)| {
                let format = formats.get(i).copied().unwrap_or_default();
                match (self.trace.values.payload(*arg), format) {
                    (None, _) => "[opaque value]".to_string(),
                    (Some(Payload::Int(n)), ArgFormat::Hex) => format!("{:#x}", n),
                    _ => self.trace.values.display(*arg).to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SessionConfig;
    use crate::interpreter::engine::{ArgFormat, Interpreter, NativeMode, RunToCompletion};
    use crate::interpreter::errors::ExecError;

    fn interpreter(source: &str) -> Interpreter {
        let mut interp = Interpreter::new(source, SessionConfig::default()).unwrap();
        interp.run_globals(&mut RunToCompletion).unwrap();
        interp
    }

    #[test]
    fn test_verbose_prints_formatted_arguments() {
        let source = "void write_reg(int reg, int val) { }\nint main()\n{\n  write_reg(16, 255);\n  return 0;\n}\n";
        let mut interp = interpreter(source);
        interp.set_verbose("write_reg", vec![ArgFormat::Decimal, ArgFormat::Hex]);

        interp.invoke("main", &[], &mut RunToCompletion).unwrap();

        assert_eq!(interp.console.output(), vec!["Line 4: write_reg(16, 255) => 16, 0xff"]);
    }

    #[test]
    fn test_verbose_marks_opaque_arguments() {
        let source = "int main()\n{\n  log_val(unknown);\n  return 0;\n}\n";
        let mut interp = interpreter(source);
        interp.set_verbose("log_val", vec![]);

        interp.invoke("main", &[], &mut RunToCompletion).unwrap();

        assert_eq!(interp.console.output(), vec!["Line 3: log_val(unknown) => [opaque value]"]);
    }

    #[test]
    fn test_native_replace_and_observe() {
        let source = "int read_reg(int r)\n{\n  return 7;\n}\nint seen = 0;\n";
        let mut interp = Interpreter::new(source, SessionConfig::default()).unwrap();
        interp.register_native("read_reg", NativeMode::Replace, |interp, args| {
            let r = interp.trace.values.as_int(args[0]).unwrap_or(0);
            Ok(interp.int(r * 100, "read_reg"))
        });
        interp.register_native("probe_hook", NativeMode::Observe, |interp, _| {
            interp.print("hooked\n");
            Ok(interp.int(1, "probe_hook"))
        });
        interp.run_globals(&mut RunToCompletion).unwrap();

        let three = interp.int(3, "3");
        let replaced = interp.invoke("read_reg", &[three], &mut RunToCompletion).unwrap();
        assert_eq!(interp.trace.values.as_int(replaced), Some(300));

        let observed = interp.evaluate("probe_hook()", &mut RunToCompletion).unwrap().value;
        assert_eq!(interp.trace.values.as_int(observed), Some(1));
        assert_eq!(interp.console.output(), vec!["hooked"]);
    }

    #[test]
    fn test_missing_arguments_are_opaque() {
        let mut interp = interpreter("int id(int a)\n{\n  return a;\n}\n");
        let result = interp.invoke("id", &[], &mut RunToCompletion).unwrap();
        assert!(!interp.trace.values.is_concrete(result));
    }

    #[test]
    fn test_unknown_function_is_opaque_unless_strict() {
        let source = "int main()\n{\n  return mystery(1);\n}\n";
        let mut lenient = interpreter(source);
        let result = lenient.invoke("main", &[], &mut RunToCompletion).unwrap();
        assert!(!lenient.trace.values.is_concrete(result));

        let mut strict = Interpreter::new(source, SessionConfig::default().with_strict_names(true)).unwrap();
        let err = strict.invoke("main", &[], &mut RunToCompletion).unwrap_err();
        assert!(matches!(err, ExecError::UnboundName { ref name, line: 3 } if name == "mystery"));
    }

    #[test]
    fn test_calls_through_function_pointers() {
        let mut interp = interpreter("int twice(int v) { return v * 2; }\n");
        interp.evaluate("op = twice", &mut RunToCompletion).unwrap();
        let direct = interp.evaluate("op(4)", &mut RunToCompletion).unwrap().value;
        let starred = interp.evaluate("(*op)(5)", &mut RunToCompletion).unwrap().value;
        assert_eq!(interp.trace.values.as_int(direct), Some(8));
        assert_eq!(interp.trace.values.as_int(starred), Some(10));

        interp.evaluate("op = &twice", &mut RunToCompletion).unwrap();
        let addressed = interp.evaluate("op(1)", &mut RunToCompletion).unwrap().value;
        assert_eq!(interp.trace.values.as_int(addressed), Some(2));
    }

    #[test]
    fn test_function_addresses_taken_at_file_scope() {
        let source = "int twice(int v) { return v * 2; }\nvoid *op = &twice;\nvoid *op2 = twice;\nint m() { return op2(3) + op(1); }\n";
        let mut interp = interpreter(source);

        let result = interp.invoke("m", &[], &mut RunToCompletion).unwrap();
        assert_eq!(interp.trace.values.as_int(result), Some(8));

        let addressed = interp.evaluate("&twice", &mut RunToCompletion).unwrap().value;
        assert_eq!(interp.trace.values.display(addressed).to_string(), "<function twice>");
    }
}
