//! Runtime value representation
//!
//! Every value produced while interpreting lives in a [`ValueStore`] arena
//! and is addressed by a [`ValueId`]. A value is either concrete or opaque,
//! and records the source text, line and operand values that produced it.
//! Values are never mutated after creation except for their canonical link:
//! an opaque value that turns out to stand for something concrete (an
//! opaque pointer that got dereferenced) points at that concrete value.

use super::tree::{Path, Selector};
use crate::parser::ast::BinOp;
use std::fmt;
use std::rc::Rc;

/// Handle into the value arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub usize);

/// Contents of a concrete value
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Int(i64),
    Str(Rc<str>),
    /// Address of a memory-tree node
    Ptr(Path),
    Func(Rc<str>),
    /// Summary of a node with children (struct or array contents)
    Aggregate(Vec<(Selector, ValueId)>),
}

/// What an opaque value is known to be
#[derive(Debug, Clone, PartialEq)]
pub enum Opacity {
    /// Unconstrained, numbered for display
    Fresh(u64),
    /// Result of an operator with at least one opaque operand
    Derived { op: BinOp, lhs: ValueId, rhs: ValueId },
    /// Result of any other operation on opaque input
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Concrete(Payload),
    Opaque(Opacity),
}

/// Where a value came from: the expression text and line that produced it,
/// and the values it was computed from
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub text: Rc<str>,
    pub line: usize,
    pub operands: Vec<ValueId>,
}

impl Provenance {
    pub fn new(text: impl Into<Rc<str>>, line: usize) -> Self {
        Self {
            text: text.into(),
            line,
            operands: Vec::new(),
        }
    }

    pub fn with_operands(mut self, operands: Vec<ValueId>) -> Self {
        self.operands = operands;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Value {
    pub datum: Datum,
    pub provenance: Provenance,
    canonical: Option<ValueId>,
}

/// Arena of every value created in a session
#[derive(Debug, Clone, Default)]
pub struct ValueStore {
    values: Vec<Value>,
    next_opaque: u64,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, id: ValueId) -> &Value {
        &self.values[id.0]
    }

    fn push(&mut self, datum: Datum, provenance: Provenance) -> ValueId {
        let id = ValueId(self.values.len());
        self.values.push(Value {
            datum,
            provenance,
            canonical: None,
        });
        id
    }

    pub fn concrete(&mut self, payload: Payload, provenance: Provenance) -> ValueId {
        self.push(Datum::Concrete(payload), provenance)
    }

    pub fn int(&mut self, value: i64, provenance: Provenance) -> ValueId {
        self.concrete(Payload::Int(value), provenance)
    }

    /// A new, unconstrained opaque value
    pub fn opaque(&mut self, provenance: Provenance) -> ValueId {
        let number = self.next_opaque;
        self.next_opaque += 1;
        self.push(Datum::Opaque(Opacity::Fresh(number)), provenance)
    }

    pub fn derived(&mut self, opacity: Opacity, provenance: Provenance) -> ValueId {
        self.push(Datum::Opaque(opacity), provenance)
    }

    /// Follow canonical links to the most concrete member of the class
    pub fn canonical(&self, id: ValueId) -> ValueId {
        let mut current = id;
        while let Some(next) = self.values[current.0].canonical {
            current = next;
        }
        current
    }

    /// Record that `id` stands for `concrete` from now on
    pub fn set_canonical(&mut self, id: ValueId, concrete: ValueId) {
        let root = self.canonical(id);
        if root != concrete {
            self.values[root.0].canonical = Some(concrete);
        }
    }

    /// The datum of the canonical element
    pub fn datum(&self, id: ValueId) -> &Datum {
        &self.values[self.canonical(id).0].datum
    }

    pub fn payload(&self, id: ValueId) -> Option<&Payload> {
        match self.datum(id) {
            Datum::Concrete(payload) => Some(payload),
            Datum::Opaque(_) => None,
        }
    }

    pub fn is_concrete(&self, id: ValueId) -> bool {
        self.payload(id).is_some()
    }

    pub fn as_int(&self, id: ValueId) -> Option<i64> {
        match self.payload(id) {
            Some(Payload::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn as_ptr(&self, id: ValueId) -> Option<&Path> {
        match self.payload(id) {
            Some(Payload::Ptr(path)) => Some(path),
            _ => None,
        }
    }

    /// C truth value; `None` when the value is opaque
    pub fn truthy(&self, id: ValueId) -> Option<bool> {
        self.payload(id).map(|payload| match payload {
            Payload::Int(n) => *n != 0,
            _ => true,
        })
    }

    /// Printable form of a value, as shown by `Value:` lines and memory dumps
    pub fn display(&self, id: ValueId) -> DisplayValue<'_> {
        DisplayValue { store: self, id }
    }
}

pub struct DisplayValue<'a> {
    store: &'a ValueStore,
    id: ValueId,
}

impl fmt::Display for DisplayValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.store.datum(self.id) {
            Datum::Concrete(Payload::Int(n)) => write!(f, "{}", n),
            Datum::Concrete(Payload::Str(s)) => write!(f, "{:?}", s),
            Datum::Concrete(Payload::Ptr(path)) => write!(f, "{}", path),
            Datum::Concrete(Payload::Func(name)) => write!(f, "<function {}>", name),
            Datum::Concrete(Payload::Aggregate(items)) => {
                write!(f, "{{")?;
                for (i, (selector, value)) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", selector, self.store.display(*value))?;
                }
                write!(f, "}}")
            }
            Datum::Opaque(Opacity::Fresh(n)) => write!(f, "[opaque #{}]", n),
            Datum::Opaque(_) => write!(f, "[opaque expr]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tree::AllocId;

    #[test]
    fn test_canonical_link_makes_opaque_concrete() {
        let mut store = ValueStore::new();
        let p = store.opaque(Provenance::new("p", 1));
        assert_eq!(store.truthy(p), None);
        assert_eq!(store.display(p).to_string(), "[opaque #0]");

        let path = Path::root(AllocId(3)).child(Selector::Index(0));
        let target = store.concrete(Payload::Ptr(path.clone()), Provenance::new("p", 1));
        store.set_canonical(p, target);

        assert_eq!(store.as_ptr(p), Some(&path));
        assert_eq!(store.display(p).to_string(), "(3, 0)");
        // the record itself keeps its own provenance
        assert_eq!(&*store.get(p).provenance.text, "p");
    }

    #[test]
    fn test_truthiness() {
        let mut store = ValueStore::new();
        let zero = store.int(0, Provenance::new("0", 1));
        let name = store.concrete(Payload::Str("s".into()), Provenance::new("\"s\"", 1));
        assert_eq!(store.truthy(zero), Some(false));
        assert_eq!(store.truthy(name), Some(true));
    }
}
