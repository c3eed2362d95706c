//! Binary operator evaluation

use crate::interpreter::engine::{Debugger, Interpreter};
use crate::interpreter::errors::ExecError;
use crate::memory::{Datum, Opacity, Path, Payload, Provenance, ValueId, ValueStore};
use crate::parser::ast::{BinOp, Expr};
use tracing::warn;

impl Interpreter {
    pub(crate) fn evaluate_binary(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        expr: &Expr,
        debugger: &mut dyn Debugger,
    ) -> Result<ValueId, ExecError> {
        let left = self.eval(lhs, debugger)?;
        if op.is_short_circuit() {
            let decided = match (op, self.trace.values.truthy(left)) {
                (BinOp::And, Some(false)) => Some(0),
                (BinOp::Or, Some(true)) => Some(1),
                _ => None,
            };
            if let Some(result) = decided {
                let provenance = self.provenance(expr).with_operands(vec![left]);
                return Ok(self.trace.values.int(result, provenance));
            }
        }
        let right = self.eval(rhs, debugger)?;
        self.combine(op, left, right, expr)
    }

    /// `left op right` with string operands decayed to pointers
    pub(crate) fn combine(&mut self, op: BinOp, left: ValueId, right: ValueId, expr: &Expr) -> Result<ValueId, ExecError> {
        self.decay(left);
        self.decay(right);
        let provenance = self.provenance(expr).with_operands(vec![left, right]);
        binary(&mut self.trace.values, op, left, right, provenance)
    }

    /// Store a string literal so that it takes part in pointer arithmetic
    pub(crate) fn decay(&mut self, value: ValueId) {
        if matches!(self.trace.values.payload(value), Some(Payload::Str(_))) {
            self.trace.deref(value);
        }
    }
}

/// Apply `op` to two values.
///
/// Concrete integers give the native result (wrapping, 0/1 for relations).
/// Pointers support `+`/`-` with an integer, subtraction and comparison
/// with a pointer into the same array, and comparison with zero. An opaque
/// operand makes the result opaque. Division by zero and pointer
/// operations the tree model cannot answer give an opaque result too.
pub fn binary(
    values: &mut ValueStore,
    op: BinOp,
    lhs: ValueId,
    rhs: ValueId,
    provenance: Provenance,
) -> Result<ValueId, ExecError> {
    let line = provenance.line;
    let (left, right) = match (values.datum(lhs), values.datum(rhs)) {
        (Datum::Concrete(l), Datum::Concrete(r)) => (l.clone(), r.clone()),
        _ => return Ok(opaque(values, op, lhs, rhs, provenance)),
    };
    if op.is_short_circuit() {
        let (Some(l), Some(r)) = (values.truthy(lhs), values.truthy(rhs)) else {
            return Ok(opaque(values, op, lhs, rhs, provenance));
        };
        let result = if op == BinOp::And { l && r } else { l || r };
        return Ok(values.int(result as i64, provenance));
    }
    let payload = match (&left, &right) {
        (Payload::Int(a), Payload::Int(b)) => match integer(op, *a, *b) {
            Some(n) => Payload::Int(n),
            None => {
                warn!(line, operator = op.symbol(), "division by zero; result is opaque");
                return Ok(opaque(values, op, lhs, rhs, provenance));
            }
        },
        (Payload::Ptr(path), Payload::Int(k)) => match pointer_and_int(op, path, *k) {
            Some(payload) => payload,
            None => return Ok(unanswerable(values, op, lhs, rhs, provenance)),
        },
        (Payload::Int(k), Payload::Ptr(path)) => {
            let swapped = match op {
                BinOp::Add | BinOp::Eq | BinOp::Ne => Some(op),
                _ => None,
            };
            match swapped.and_then(|op| pointer_and_int(op, path, *k)) {
                Some(payload) => payload,
                None => return Ok(unanswerable(values, op, lhs, rhs, provenance)),
            }
        }
        (Payload::Ptr(a), Payload::Ptr(b)) => match pointers(op, a, b) {
            Some(payload) => payload,
            None => return Ok(unanswerable(values, op, lhs, rhs, provenance)),
        },
        (Payload::Func(a), Payload::Func(b)) if matches!(op, BinOp::Eq | BinOp::Ne) => {
            Payload::Int(((a == b) == (op == BinOp::Eq)) as i64)
        }
        (Payload::Func(_), Payload::Int(0)) | (Payload::Int(0), Payload::Func(_))
            if matches!(op, BinOp::Eq | BinOp::Ne) =>
        {
            Payload::Int((op == BinOp::Ne) as i64)
        }
        _ => {
            return Err(ExecError::UnsupportedOperator {
                operator: op.symbol().to_string(),
                detail: format!("{} and {} operands", kind(&left), kind(&right)),
                line,
            })
        }
    };
    Ok(values.concrete(payload, provenance))
}

/// Native result of `a op b`; `None` for division by zero
pub fn integer(op: BinOp, a: i64, b: i64) -> Option<i64> {
    Some(match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => {
            if b == 0 {
                return None;
            }
            a.wrapping_div(b)
        }
        BinOp::Mod => {
            if b == 0 {
                return None;
            }
            a.wrapping_rem(b)
        }
        BinOp::Eq => (a == b) as i64,
        BinOp::Ne => (a != b) as i64,
        BinOp::Lt => (a < b) as i64,
        BinOp::Le => (a <= b) as i64,
        BinOp::Gt => (a > b) as i64,
        BinOp::Ge => (a >= b) as i64,
        BinOp::And => (a != 0 && b != 0) as i64,
        BinOp::Or => (a != 0 || b != 0) as i64,
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::BitShl => a.wrapping_shl(b as u32),
        BinOp::BitShr => a.wrapping_shr(b as u32),
    })
}

fn pointer_and_int(op: BinOp, path: &Path, k: i64) -> Option<Payload> {
    match op {
        BinOp::Add | BinOp::Sub => {
            let offset = if op == BinOp::Sub { k.wrapping_neg() } else { k };
            if offset == 0 {
                return Some(Payload::Ptr(path.clone()));
            }
            path.offset(offset).map(Payload::Ptr)
        }
        // pointers are never null
        BinOp::Eq if k == 0 => Some(Payload::Int(0)),
        BinOp::Ne if k == 0 => Some(Payload::Int(1)),
        _ => None,
    }
}

fn pointers(op: BinOp, a: &Path, b: &Path) -> Option<Payload> {
    match op {
        BinOp::Eq => Some(Payload::Int((a == b) as i64)),
        BinOp::Ne => Some(Payload::Int((a != b) as i64)),
        BinOp::Sub => a.distance(b).map(Payload::Int),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let distance = a.distance(b)?;
            integer(op, distance, 0).map(Payload::Int)
        }
        _ => None,
    }
}

fn opaque(values: &mut ValueStore, op: BinOp, lhs: ValueId, rhs: ValueId, provenance: Provenance) -> ValueId {
    values.derived(Opacity::Derived { op, lhs, rhs }, provenance)
}

fn unanswerable(values: &mut ValueStore, op: BinOp, lhs: ValueId, rhs: ValueId, provenance: Provenance) -> ValueId {
    warn!(
        line = provenance.line,
        operator = op.symbol(),
        "pointer operation has no answer in the tree model; result is opaque"
    );
    values.derived(Opacity::Unknown, provenance.with_operands(vec![lhs, rhs]))
}

fn kind(payload: &Payload) -> &'static str {
    match payload {
        Payload::Int(_) => "integer",
        Payload::Str(_) => "string",
        Payload::Ptr(_) => "pointer",
        Payload::Func(_) => "function",
        Payload::Aggregate(_) => "aggregate",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{AllocId, Selector};

    fn at() -> Provenance {
        Provenance::new("e", 1)
    }

    #[test]
    fn test_integer_semantics() {
        assert_eq!(integer(BinOp::Div, 7, -2), Some(-3));
        assert_eq!(integer(BinOp::Mod, -7, 2), Some(-1));
        assert_eq!(integer(BinOp::Div, 1, 0), None);
        assert_eq!(integer(BinOp::BitShl, 1, 4), Some(16));
        assert_eq!(integer(BinOp::Ge, 2, 2), Some(1));
    }

    #[test]
    fn test_division_by_zero_is_opaque() {
        let mut values = ValueStore::new();
        let one = values.int(1, at());
        let zero = values.int(0, at());
        let result = binary(&mut values, BinOp::Div, one, zero, at()).unwrap();
        assert!(!values.is_concrete(result));
    }

    #[test]
    fn test_pointer_arithmetic_moves_the_last_index() {
        let mut values = ValueStore::new();
        let cell = Path::root(AllocId(1)).child(Selector::Index(2));
        let p = values.concrete(Payload::Ptr(cell.clone()), at());
        let three = values.int(3, at());

        let q = binary(&mut values, BinOp::Add, three, p, at()).unwrap();
        assert_eq!(values.as_ptr(q), cell.offset(3).as_ref());

        let back = binary(&mut values, BinOp::Sub, q, p, at()).unwrap();
        assert_eq!(values.as_int(back), Some(3));

        let zero = values.int(0, at());
        let null_check = binary(&mut values, BinOp::Ne, p, zero, at()).unwrap();
        assert_eq!(values.as_int(null_check), Some(1));
    }

    #[test]
    fn test_pointer_into_a_scalar_is_unanswerable() {
        let mut values = ValueStore::new();
        let p = values.concrete(Payload::Ptr(Path::root(AllocId(0))), at());
        let one = values.int(1, at());
        let q = binary(&mut values, BinOp::Add, p, one, at()).unwrap();
        assert!(!values.is_concrete(q));
    }

    #[test]
    fn test_functions_in_arithmetic_are_rejected() {
        let mut values = ValueStore::new();
        let f = values.concrete(Payload::Func("probe".into()), at());
        let one = values.int(1, at());
        let err = binary(&mut values, BinOp::Mul, f, one, at()).unwrap_err();
        assert!(matches!(err, ExecError::UnsupportedOperator { ref operator, .. } if operator == "*"));
    }
}
