//! Memory access: resolving expressions to memory-tree paths

use crate::interpreter::engine::{Debugger, Interpreter};
use crate::interpreter::errors::ExecError;
use crate::interpreter::expressions::Binding;
use crate::memory::{Path, Selector, ValueId};
use crate::parser::ast::{BinOp, Expr, ExprKind, UnOp};

impl Interpreter {
    /// The node `expr` denotes. Nodes on the way are created as needed.
    pub(crate) fn place(&mut self, expr: &Expr, debugger: &mut dyn Debugger) -> Result<Path, ExecError> {
        match &expr.kind {
            ExprKind::Ident(name) => match self.resolve(name, expr.line)? {
                Binding::Variable(alloc) => Ok(Path::root(alloc)),
                Binding::Function(_) => Err(self.not_assignable(expr)),
            },
            ExprKind::Unary {
                op: UnOp::Deref,
                operand,
            } => {
                let pointer = self.eval(operand, debugger)?;
                self.dereference(pointer, expr)
            }
            ExprKind::Index { base, index } => {
                // `a[i]` is `*(a + i)`
                let base_value = self.eval(base, debugger)?;
                let index_value = self.eval(index, debugger)?;
                let address = self.combine(BinOp::Add, base_value, index_value, expr)?;
                self.dereference(address, expr)
            }
            ExprKind::Member { base, field } => Ok(self.place(base, debugger)?.child(Selector::Field(field.clone()))),
            ExprKind::PointerMember { base, field } => {
                let pointer = self.eval(base, debugger)?;
                Ok(self.dereference(pointer, expr)?.child(Selector::Field(field.clone())))
            }
            ExprKind::Cast(inner) => self.place(inner, debugger),
            _ => Err(self.not_assignable(expr)),
        }
    }

    fn dereference(&mut self, pointer: ValueId, expr: &Expr) -> Result<Path, ExecError> {
        self.trace.deref(pointer).ok_or_else(|| ExecError::UnsupportedOperator {
            operator: "*".to_string(),
            detail: format!("'{}' does not point into memory", self.trace.values.display(pointer)),
            line: expr.line,
        })
    }

    fn not_assignable(&self, expr: &Expr) -> ExecError {
        ExecError::NotAnLvalue {
            text: expr.text.to_string(),
            line: expr.line,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SessionConfig;
    use crate::interpreter::engine::{Interpreter, RunToCompletion};
    use crate::memory::Selector;

    #[test]
    fn test_writes_through_opaque_pointers_create_minimal_nodes() {
        let mut interp = Interpreter::new("", SessionConfig::default()).unwrap();
        let before = interp.trace.memory.node_count();

        let place = interp
            .evaluate("dev->regs[7].ctrl", &mut RunToCompletion)
            .unwrap()
            .place
            .unwrap();
        interp.evaluate("dev->regs[7].ctrl = 1", &mut RunToCompletion).unwrap();

        assert_eq!(place.steps.last(), Some(&Selector::Field("ctrl".into())));
        let again = interp.evaluate("dev->regs[7].ctrl", &mut RunToCompletion).unwrap();
        assert_eq!(interp.trace.values.as_int(again.value), Some(1));
        assert_eq!(again.place, Some(place.clone()));

        let mut sibling = place.clone();
        sibling.steps.pop();
        sibling.steps.pop();
        sibling.steps.push(Selector::Index(6));
        assert!(interp.trace.memory.get(&sibling).is_none());
        assert!(interp.trace.memory.node_count() > before);
    }

    #[test]
    fn test_function_names_are_not_assignable() {
        let mut interp = Interpreter::new("int f() { return 1; }", SessionConfig::default()).unwrap();
        assert!(interp.evaluate("f = 2", &mut RunToCompletion).is_err());
    }
}
