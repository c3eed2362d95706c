//! Interpreter for lowered C
//!
//! This module executes the flat instruction streams produced by
//! [`crate::lower`] over the tree memory model:
//! - [`engine`]: the interpreter, its state machine and breakpoints
//! - [`expressions`]: expression evaluation, `exec_c`/`eval_c`
//! - [`ops`]: operator semantics and memory access
//! - [`calls`]: native interception, verbose tracing, C calls
//! - [`statements`]: declarations
//! - [`errors`]: runtime error types
//!
//! # Execution Model
//!
//! Instructions run one at a time. A breakpoint suspends before the first
//! instruction of its line and hands the interpreter to a [`Debugger`],
//! which may inspect and modify state and run nested invocations before
//! resuming or aborting.
//!
//! Branches on opaque conditions always take the `then` target; there is
//! no exploration of the other side.

pub mod calls;
pub mod engine;
pub mod errors;
pub mod expressions;
pub mod ops;
pub mod statements;

pub use engine::{
    ArgFormat, BreakAction, Breakpoints, Debugger, Evaluation, ExecState, Interpreter, Native, NativeFn, NativeMode,
    RunToCompletion,
};
pub use errors::ExecError;
