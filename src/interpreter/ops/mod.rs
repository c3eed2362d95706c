//! Operator semantics over the value store.
//!
//! `binary` and `unary` are pure functions of the store so they can be
//! exercised without an interpreter; the `impl Interpreter` blocks in each
//! submodule evaluate operand expressions and record provenance.

pub mod access;
pub mod assign;
pub mod binary;
pub mod unary;

pub use binary::{binary, integer};
pub use unary::unary;
