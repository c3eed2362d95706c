//! Assignment, compound assignment and increment/decrement

use crate::interpreter::engine::{Debugger, Interpreter};
use crate::interpreter::errors::ExecError;
use crate::memory::{Provenance, ValueId};
use crate::parser::ast::{BinOp, Expr, UnOp};

impl Interpreter {
    /// `target = value`; the right-hand side is evaluated first and is
    /// also the result
    pub(crate) fn evaluate_assign(
        &mut self,
        target: &Expr,
        value: &Expr,
        debugger: &mut dyn Debugger,
    ) -> Result<ValueId, ExecError> {
        let result = self.eval(value, debugger)?;
        let path = self.place(target, debugger)?;
        self.decay(result);
        self.trace.write(&path, result);
        Ok(result)
    }

    pub(crate) fn evaluate_compound_assign(
        &mut self,
        op: BinOp,
        target: &Expr,
        value: &Expr,
        expr: &Expr,
        debugger: &mut dyn Debugger,
    ) -> Result<ValueId, ExecError> {
        let path = self.place(target, debugger)?;
        let old = self.trace.read(&path, &self.provenance(target));
        let rhs = self.eval(value, debugger)?;
        let result = self.combine(op, old, rhs, expr)?;
        self.trace.write(&path, result);
        Ok(result)
    }

    pub(crate) fn evaluate_inc_dec(
        &mut self,
        op: UnOp,
        operand: &Expr,
        expr: &Expr,
        debugger: &mut dyn Debugger,
    ) -> Result<ValueId, ExecError> {
        let path = self.place(operand, debugger)?;
        let old = self.trace.read(&path, &self.provenance(operand));
        let one = self.trace.values.int(1, Provenance::new("1", expr.line));
        let step = match op {
            UnOp::PreInc | UnOp::PostInc => BinOp::Add,
            _ => BinOp::Sub,
        };
        let new = self.combine(step, old, one, expr)?;
        self.trace.write(&path, new);
        Ok(match op {
            UnOp::PreInc | UnOp::PreDec => new,
            _ => old,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SessionConfig;
    use crate::interpreter::engine::{Interpreter, RunToCompletion};

    fn int(interp: &mut Interpreter, text: &str) -> Option<i64> {
        let value = interp.evaluate(text, &mut RunToCompletion).unwrap().value;
        interp.trace.values.as_int(value)
    }

    #[test]
    fn test_increment_returns_old_or_new_value() {
        let mut interp = Interpreter::new("int i = 4;", SessionConfig::default()).unwrap();
        interp.run_globals(&mut RunToCompletion).unwrap();

        assert_eq!(int(&mut interp, "i++"), Some(4));
        assert_eq!(int(&mut interp, "++i"), Some(6));
        assert_eq!(int(&mut interp, "i--"), Some(6));
        assert_eq!(int(&mut interp, "i"), Some(5));
    }

    #[test]
    fn test_compound_assignment_through_a_pointer() {
        let mut interp = Interpreter::new("int a[2] = {1, 2};\nint *p = a;", SessionConfig::default()).unwrap();
        interp.run_globals(&mut RunToCompletion).unwrap();

        assert_eq!(int(&mut interp, "p[1] *= 5"), Some(10));
        assert_eq!(int(&mut interp, "a[1]"), Some(10));
        assert_eq!(int(&mut interp, "*p <<= 3"), Some(8));
    }
}
