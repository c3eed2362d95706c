//! Unary operator evaluation

use crate::interpreter::engine::{Debugger, Interpreter};
use crate::interpreter::errors::ExecError;
use crate::memory::{Datum, Opacity, Path, Payload, Provenance, ValueId, ValueStore};
use crate::parser::ast::{Expr, ExprKind, UnOp};
use std::rc::Rc;

impl Interpreter {
    pub(crate) fn evaluate_unary(
        &mut self,
        op: UnOp,
        operand: &Expr,
        expr: &Expr,
        debugger: &mut dyn Debugger,
    ) -> Result<ValueId, ExecError> {
        match op {
            UnOp::Deref => {
                let path = self.place(expr, debugger)?;
                Ok(self.trace.read(&path, &self.provenance(expr)))
            }
            UnOp::AddrOf => {
                // `&f` is just `f`
                if let ExprKind::Ident(name) = &operand.kind {
                    if self.names_function(name) {
                        return self.eval(operand, debugger);
                    }
                }
                let path = self.place(operand, debugger)?;
                Ok(self.trace.values.concrete(Payload::Ptr(path), self.provenance(expr)))
            }
            UnOp::PreInc | UnOp::PreDec | UnOp::PostInc | UnOp::PostDec => {
                self.evaluate_inc_dec(op, operand, expr, debugger)
            }
            UnOp::Neg | UnOp::Plus | UnOp::Not | UnOp::BitNot => {
                let value = self.eval(operand, debugger)?;
                let provenance = self.provenance(expr).with_operands(vec![value]);
                unary(&mut self.trace.values, op, value, provenance)
            }
        }
    }

    /// True when `name` denotes a function rather than a variable: either it
    /// is unbound and has a body or native handler, or its cell still holds
    /// the function it was bound to by `run_globals`.
    fn names_function(&self, name: &Rc<str>) -> bool {
        match self.trace.lookup(name) {
            Some(alloc) => {
                let stored = self.trace.memory.get(&Path::root(alloc)).and_then(|node| node.value);
                matches!(
                    stored.and_then(|value| self.trace.values.payload(value)),
                    Some(Payload::Func(function)) if function == name
                )
            }
            None => self.unit.function(name).is_some() || self.natives.contains_key(name),
        }
    }
}

/// Apply an arithmetic or logical prefix operator. An opaque operand gives
/// an opaque result; `!` is also defined for pointers and functions, which
/// are never null.
pub fn unary(values: &mut ValueStore, op: UnOp, operand: ValueId, provenance: Provenance) -> Result<ValueId, ExecError> {
    let payload = match values.datum(operand) {
        Datum::Opaque(_) => return Ok(values.derived(Opacity::Unknown, provenance)),
        Datum::Concrete(payload) => payload.clone(),
    };
    let result = match (op, &payload) {
        (UnOp::Neg, Payload::Int(n)) => n.wrapping_neg(),
        (UnOp::Plus, Payload::Int(n)) => *n,
        (UnOp::BitNot, Payload::Int(n)) => !n,
        (UnOp::Not, Payload::Int(n)) => (*n == 0) as i64,
        (UnOp::Not, Payload::Ptr(_) | Payload::Func(_) | Payload::Str(_)) => 0,
        _ => {
            return Err(ExecError::UnsupportedOperator {
                operator: op.symbol().to_string(),
                detail: "operand is not an integer".to_string(),
                line: provenance.line,
            })
        }
    };
    Ok(values.int(result, provenance))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_operators() {
        let mut values = ValueStore::new();
        let five = values.int(5, Provenance::new("5", 1));
        let neg = unary(&mut values, UnOp::Neg, five, Provenance::new("- 5", 1)).unwrap();
        let not = unary(&mut values, UnOp::Not, five, Provenance::new("! 5", 1)).unwrap();
        let inv = unary(&mut values, UnOp::BitNot, five, Provenance::new("~ 5", 1)).unwrap();

        assert_eq!(values.as_int(neg), Some(-5));
        assert_eq!(values.as_int(not), Some(0));
        assert_eq!(values.as_int(inv), Some(-6));
    }

    #[test]
    fn test_opaque_operand_stays_opaque() {
        let mut values = ValueStore::new();
        let unknown = values.opaque(Provenance::new("x", 1));
        let result = unary(&mut values, UnOp::Neg, unknown, Provenance::new("- x", 1)).unwrap();
        assert!(!values.is_concrete(result));
    }
}
