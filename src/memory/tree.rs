//! Tree-shaped memory
//!
//! Memory is a forest: one tree per allocation. A node is addressed by a
//! [`Path`], the allocation id followed by child selectors (array indices and
//! field names), never by a linear address. Nodes come into existence the
//! first time a path through them is used, so an allocation never needs a
//! size: writing `p[7].f` creates exactly the nodes `7` and `7.f` under the
//! pointee and nothing else.

use super::value::ValueId;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocId(pub usize);

/// One step down the memory tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Selector {
    Index(i64),
    Field(Rc<str>),
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Index(i) => write!(f, "{}", i),
            Selector::Field(name) => write!(f, ".{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    pub alloc: AllocId,
    pub steps: Vec<Selector>,
}

impl Path {
    pub fn root(alloc: AllocId) -> Self {
        Self {
            alloc,
            steps: Vec::new(),
        }
    }

    pub fn child(&self, selector: Selector) -> Self {
        let mut steps = self.steps.clone();
        steps.push(selector);
        Self {
            alloc: self.alloc,
            steps,
        }
    }

    /// The path `offset` cells away, for paths ending in an index
    pub fn offset(&self, offset: i64) -> Option<Self> {
        let Some(Selector::Index(last)) = self.steps.last() else {
            return None;
        };
        let mut steps = self.steps.clone();
        let end = steps.len() - 1;
        steps[end] = Selector::Index(last.wrapping_add(offset));
        Some(Self {
            alloc: self.alloc,
            steps,
        })
    }

    /// Distance between two cells of the same array
    pub fn distance(&self, other: &Path) -> Option<i64> {
        let (Some(Selector::Index(a)), Some(Selector::Index(b))) = (self.steps.last(), other.steps.last()) else {
            return None;
        };
        let same_array = self.alloc == other.alloc
            && self.steps.len() == other.steps.len()
            && self.steps[..self.steps.len() - 1] == other.steps[..other.steps.len() - 1];
        same_array.then(|| a.wrapping_sub(*b))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.alloc.0)?;
        for step in &self.steps {
            write!(f, ", {}", step)?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, Default)]
pub struct Node {
    /// `None` until first written or read
    pub value: Option<ValueId>,
    pub children: BTreeMap<Selector, Node>,
}

impl Node {
    /// Number of nodes in this subtree, itself included
    pub fn count(&self) -> usize {
        1 + self.children.values().map(Node::count).sum::<usize>()
    }
}

#[derive(Debug, Clone)]
pub struct Allocation {
    /// What the allocation was made for (a variable name, `malloc`, ...)
    pub label: Rc<str>,
    pub root: Node,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryTree {
    allocations: Vec<Allocation>,
    /// Allocations standing for concrete integer addresses
    absolute: FxHashMap<i64, AllocId>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, label: impl Into<Rc<str>>) -> AllocId {
        let id = AllocId(self.allocations.len());
        let label = label.into();
        trace!(alloc = id.0, label = &*label, "allocated");
        self.allocations.push(Allocation {
            label,
            root: Node::default(),
        });
        id
    }

    /// The allocation standing for integer address `address`
    pub fn absolute(&mut self, address: i64) -> AllocId {
        if let Some(id) = self.absolute.get(&address) {
            return *id;
        }
        let id = self.allocate(format!("0x{:x}", address));
        self.absolute.insert(address, id);
        id
    }

    pub fn allocation(&self, id: AllocId) -> Option<&Allocation> {
        self.allocations.get(id.0)
    }

    pub fn allocations(&self) -> impl Iterator<Item = (AllocId, &Allocation)> {
        self.allocations.iter().enumerate().map(|(i, a)| (AllocId(i), a))
    }

    /// Existing node at `path`, without creating anything
    pub fn get(&self, path: &Path) -> Option<&Node> {
        let mut node = &self.allocations.get(path.alloc.0)?.root;
        for step in &path.steps {
            node = node.children.get(step)?;
        }
        Some(node)
    }

    /// Node at `path`, creating the missing chain of nodes on the way
    pub fn node_mut(&mut self, path: &Path) -> Option<&mut Node> {
        let mut node = &mut self.allocations.get_mut(path.alloc.0)?.root;
        for step in &path.steps {
            node = node.children.entry(step.clone()).or_default();
        }
        Some(node)
    }

    /// Total number of nodes in all allocations
    pub fn node_count(&self) -> usize {
        self.allocations.iter().map(|a| a.root.count()).sum()
    }
}
