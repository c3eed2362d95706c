//! Interpreter state: memory, values and variable scopes
//!
//! Variables are allocations: a name is bound to an [`AllocId`] in a scope
//! and its value lives at the root of that allocation. Scope 0 holds the
//! globals; each call pushes a scope. Blocks do not open scopes.

use super::tree::{AllocId, MemoryTree, Node, Path, Selector};
use super::value::{Datum, Opacity, Payload, Provenance, ValueId, ValueStore};
use crate::parser::ast::BinOp;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt::Write;
use std::rc::Rc;
use tracing::{trace, warn};

const INDENT: &str = "|   ";

#[derive(Debug, Clone)]
pub struct Trace {
    pub memory: MemoryTree,
    pub values: ValueStore,
    scopes: Vec<FxHashMap<Rc<str>, AllocId>>,
}

impl Default for Trace {
    fn default() -> Self {
        Self::new()
    }
}

impl Trace {
    pub fn new() -> Self {
        Self {
            memory: MemoryTree::new(),
            values: ValueStore::new(),
            scopes: vec![FxHashMap::default()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    /// Drop the innermost scope; the global scope is never dropped
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    /// Innermost binding of `name`, falling back to the globals
    pub fn lookup(&self, name: &str) -> Option<AllocId> {
        let innermost = self.scopes.last().and_then(|scope| scope.get(name));
        innermost
            .or_else(|| self.scopes.first().and_then(|scope| scope.get(name)))
            .copied()
    }

    /// Bind `name` to a new allocation in the innermost scope
    pub fn bind(&mut self, name: &Rc<str>) -> AllocId {
        let id = self.memory.allocate(name.clone());
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.clone(), id);
        }
        id
    }

    pub fn bind_global(&mut self, name: &Rc<str>) -> AllocId {
        let id = self.memory.allocate(name.clone());
        self.scopes[0].insert(name.clone(), id);
        id
    }

    /// Bind `name` for a declaration. A name already declared in the
    /// innermost scope keeps its allocation, whose contents are reset.
    pub fn declare(&mut self, name: &Rc<str>) -> AllocId {
        let existing = self.scopes.last().and_then(|scope| scope.get(name)).copied();
        match existing {
            Some(id) => {
                if let Some(node) = self.memory.node_mut(&Path::root(id)) {
                    *node = Node::default();
                }
                id
            }
            None => self.bind(name),
        }
    }

    pub fn is_local(&self, name: &str) -> bool {
        self.scopes.last().is_some_and(|scope| scope.contains_key(name))
    }

    /// Forget the innermost binding of `name`; its allocation stays
    pub fn unbind(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.remove(name);
        }
    }

    /// Names bound in the innermost scope, sorted
    pub fn local_names(&self) -> Vec<Rc<str>> {
        let mut names: Vec<Rc<str>> = self
            .scopes
            .last()
            .map(|scope| scope.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Value stored at `path`. Cells never written read as a fresh opaque
    /// value (remembered, so the next read agrees); cells with children read
    /// as an aggregate of the children.
    pub fn read(&mut self, path: &Path, provenance: &Provenance) -> ValueId {
        let (value, selectors) = match self.memory.get(path) {
            Some(node) => (node.value, node.children.keys().cloned().collect::<Vec<_>>()),
            None => (None, Vec::new()),
        };
        if !selectors.is_empty() {
            let items = selectors
                .into_iter()
                .map(|selector| {
                    let child = path.child(selector.clone());
                    (selector, self.read(&child, provenance))
                })
                .collect();
            return self.values.concrete(Payload::Aggregate(items), provenance.clone());
        }
        if let Some(value) = value {
            return value;
        }
        let fresh = self.values.opaque(provenance.clone());
        trace!(path = %path, "materialised unwritten cell");
        if let Some(node) = self.memory.node_mut(path) {
            node.value = Some(fresh);
        }
        fresh
    }

    /// Store `value` at `path`; aggregates are spread over the children
    pub fn write(&mut self, path: &Path, value: ValueId) {
        if let Some(Payload::Aggregate(items)) = self.values.payload(value) {
            for (selector, item) in items.clone() {
                self.write(&path.child(selector), item);
            }
            return;
        }
        if let Some(node) = self.memory.node_mut(path) {
            node.value = Some(value);
        }
    }

    /// The node a pointer value refers to.
    ///
    /// Opaque values are given a fresh allocation the first time they are
    /// dereferenced and become a pointer to it from then on; an opaque value
    /// derived by adding a concrete offset to such a pointer refers to the
    /// corresponding sibling cell. Integers address cell 0 of an absolute
    /// allocation. String literals are stored on first use and decay to a
    /// pointer to their first character. Returns `None` for values that can
    /// never be dereferenced.
    pub fn deref(&mut self, value: ValueId) -> Option<Path> {
        let datum = self.values.datum(value).clone();
        match datum {
            Datum::Concrete(Payload::Ptr(path)) => Some(path),
            Datum::Concrete(Payload::Int(address)) => {
                Some(Path::root(self.memory.absolute(address)).child(Selector::Index(0)))
            }
            Datum::Concrete(Payload::Str(text)) => {
                let path = self.store_string(&text, value);
                self.canonicalize(value, &path);
                Some(path)
            }
            Datum::Concrete(Payload::Func(_) | Payload::Aggregate(_)) => None,
            Datum::Opaque(Opacity::Derived { op, lhs, rhs }) => {
                let path = self
                    .offset_path(op, lhs, rhs)
                    .unwrap_or_else(|| self.fresh_pointee(value, "opaque pointer arithmetic"));
                self.canonicalize(value, &path);
                Some(path)
            }
            Datum::Opaque(_) => {
                let path = self.fresh_pointee(value, "dereference of an opaque value");
                self.canonicalize(value, &path);
                Some(path)
            }
        }
    }

    /// `lhs op rhs` as a cell offset from a materialised pointer
    fn offset_path(&mut self, op: BinOp, lhs: ValueId, rhs: ValueId) -> Option<Path> {
        let (base, offset) = match (op, self.values.as_int(lhs), self.values.as_int(rhs)) {
            (BinOp::Add | BinOp::Sub, None, Some(k)) => (lhs, if op == BinOp::Sub { -k } else { k }),
            (BinOp::Add, Some(k), None) => (rhs, k),
            _ => return None,
        };
        let base = self.deref(base)?;
        let moved = base.offset(offset);
        if moved.is_none() {
            warn!(path = %base, offset, "pointer arithmetic on a path that is not an array cell");
        }
        moved
    }

    fn fresh_pointee(&mut self, value: ValueId, why: &str) -> Path {
        let line = self.values.get(value).provenance.line;
        let alloc = self.memory.allocate(format!("*{}", self.values.get(value).provenance.text));
        warn!(line, alloc = alloc.0, "{}: allocating a fresh pointee", why);
        Path::root(alloc).child(Selector::Index(0))
    }

    fn canonicalize(&mut self, value: ValueId, path: &Path) {
        let provenance = self.values.get(value).provenance.clone();
        let pointer = self.values.concrete(Payload::Ptr(path.clone()), provenance);
        self.values.set_canonical(value, pointer);
    }

    fn store_string(&mut self, text: &str, value: ValueId) -> Path {
        let provenance = self.values.get(value).provenance.clone();
        let alloc = self.memory.allocate(provenance.text.clone());
        let base = Path::root(alloc);
        for (i, byte) in text.bytes().chain(std::iter::once(0)).enumerate() {
            let cell = self.values.int(byte as i64, provenance.clone());
            self.write(&base.child(Selector::Index(i as i64)), cell);
        }
        base.child(Selector::Index(0))
    }

    /// Memory at `path` in the indented `(alloc, steps) = value` format,
    /// following pointers once
    pub fn render(&self, path: &Path) -> String {
        let mut out = String::new();
        let mut seen = FxHashSet::default();
        self.render_into(path, 0, &mut seen, &mut out);
        out
    }

    /// Every allocation, in allocation order
    pub fn render_all(&self) -> String {
        let mut out = String::new();
        let mut seen = FxHashSet::default();
        for (id, allocation) in self.memory.allocations() {
            let path = Path::root(id);
            if seen.contains(&path) {
                continue;
            }
            let _ = writeln!(out, "// {}", allocation.label);
            self.render_into(&path, 0, &mut seen, &mut out);
        }
        out
    }

    fn render_into(&self, path: &Path, depth: usize, seen: &mut FxHashSet<Path>, out: &mut String) {
        let indent = INDENT.repeat(depth);
        if !seen.insert(path.clone()) {
            let _ = writeln!(out, "{}{}", indent, path);
            return;
        }
        let Some(node) = self.memory.get(path) else {
            let _ = writeln!(out, "{}{} = [unallocated]", indent, path);
            return;
        };
        if !node.children.is_empty() {
            let _ = writeln!(out, "{}{}", indent, path);
            for selector in node.children.keys() {
                self.render_into(&path.child(selector.clone()), depth + 1, seen, out);
            }
            return;
        }
        match node.value {
            Some(value) => {
                let _ = writeln!(out, "{}{} = {}", indent, path, self.values.display(value));
                if let Some(target) = self.values.as_ptr(value) {
                    if self.memory.get(target).is_some() && !seen.contains(target) {
                        self.render_into(&target.clone(), depth + 1, seen, out);
                    }
                }
            }
            None => {
                let _ = writeln!(out, "{}{} = [uninitialized]", indent, path);
            }
        }
    }
}
