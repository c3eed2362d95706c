//! Memory model for the interpreter
//!
//! This module provides the core memory abstractions:
//! - [`tree`]: Allocations as trees of nodes addressed by paths
//! - [`value`]: Concrete and opaque values with their provenance
//! - [`trace`]: Variable scopes, reads, writes and dereferences
//! - [`explain`]: On-demand explanation of where a value came from
//!
//! # Addressing
//!
//! There are no linear addresses. A pointer is a [`Path`]: an allocation
//! plus the fields and indices leading to a node. Pointer arithmetic moves
//! the last index of the path:
//! ```text
//! (3, 0) + 2  →  (3, 2)
//! (3, .buf, 4) - 1  →  (3, .buf, 3)
//! ```
//! Nodes are created on first use, so an allocation has no size and an
//! out-of-range index simply names a node nobody wrote yet.

pub mod explain;
pub mod trace;
pub mod tree;
pub mod value;

pub use explain::{opaque_reason, Explanation};
pub use trace::Trace;
pub use tree::{AllocId, MemoryTree, Path, Selector};
pub use value::{Datum, Opacity, Payload, Provenance, ValueId, ValueStore};
