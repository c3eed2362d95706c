//! # Introduction
//!
//! `ssi` runs fragments of C (typically driver code) against a symbolic
//! memory model. Values the code cannot know, such as hardware reads and
//! uninitialised memory, are *opaque*; everything computed from them stays
//! opaque, and every value can explain how it was produced.
//!
//! ## Pipeline
//!
//! ```text
//! Source → Lexer → Macros → PEG parser (with holes) → Lowering → IR → Interpreter → Shell
//! ```
//!
//! 1. [`parser`] tokenises the source and parses it with a backtracking
//!    grammar that leaves unmodelled syntax as balanced *holes*.
//! 2. [`rewrite`] matches token patterns with holes and instantiates
//!    templates; [`lower`] uses it to expand macros and to turn every
//!    control-flow statement into labels, `goto` and `goto_ite`.
//! 3. [`ir`] holds the flat instruction streams of a translation unit.
//! 4. [`memory`] is the tree-shaped memory, the value store with provenance
//!    and the explanation printer.
//! 5. [`interpreter`] executes the instruction streams, with breakpoints,
//!    native handlers and verbose call tracing.
//! 6. [`shell`] is the line-oriented command surface.
//!
//! ## Opacity
//!
//! Arithmetic on an opaque operand gives an opaque result. A branch on an
//! opaque condition always takes its `then` side. Dereferencing an opaque
//! value gives it a fresh allocation, so later dereferences alias.

pub mod config;
pub mod console;
pub mod error;
pub mod interpreter;
pub mod ir;
pub mod lower;
pub mod memory;
pub mod parser;
pub mod rewrite;
pub mod shell;

pub use config::SessionConfig;
pub use error::{EvalError, LoadError};
pub use interpreter::{ExecError, Interpreter};
pub use shell::Shell;
