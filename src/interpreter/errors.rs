//! Runtime error types for the interpreter
//!
//! An [`ExecError`] ends the invocation it happened in and nothing else:
//! memory keeps every write committed before the failure and the session
//! stays usable.
//!
//! Branching on an opaque condition and casts the value model cannot
//! express are approximations, not errors, and never produce one of these.

use crate::parser::ast::SourceLocation;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ExecError {
    /// Operator outside the supported set, or applied to operands it has no
    /// meaning for
    #[error("Unsupported operator '{operator}' at line {line}: {detail}")]
    UnsupportedOperator {
        operator: String,
        detail: String,
        line: usize,
    },

    #[error("Unbound name '{name}' at line {line}")]
    UnboundName { name: String, line: usize },

    #[error("Call depth limit ({limit}) exceeded calling '{function}' at line {line}")]
    CallDepthExceeded {
        function: String,
        limit: usize,
        line: usize,
    },

    /// A suspended execution was abandoned from the shell
    #[error("Execution aborted at line {line}")]
    Aborted { line: usize },

    /// Failure reported by a native handler
    #[error("Native handler '{name}' failed at line {line}: {message}")]
    Native {
        name: String,
        message: String,
        line: usize,
    },

    #[error("No code to execute at line {line}")]
    NoCodeAtLine { line: usize },

    #[error("'{text}' is not assignable (line {line})")]
    NotAnLvalue { text: String, line: usize },

    #[error("Jump to unknown label '{label}' at line {line}")]
    UnknownLabel { label: String, line: usize },
}

impl ExecError {
    pub fn line(&self) -> usize {
        match self {
            ExecError::UnsupportedOperator { line, .. }
            | ExecError::UnboundName { line, .. }
            | ExecError::CallDepthExceeded { line, .. }
            | ExecError::Aborted { line }
            | ExecError::Native { line, .. }
            | ExecError::NoCodeAtLine { line }
            | ExecError::NotAnLvalue { line, .. }
            | ExecError::UnknownLabel { line, .. } => *line,
        }
    }

    pub fn location(&self) -> Option<SourceLocation> {
        Some(SourceLocation::new(self.line(), 0))
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, ExecError::Aborted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_operator_and_line() {
        let err = ExecError::UnsupportedOperator {
            operator: "+".to_string(),
            detail: "function and integer operands".to_string(),
            line: 12,
        };
        assert_eq!(
            err.to_string(),
            "Unsupported operator '+' at line 12: function and integer operands"
        );
        assert_eq!(err.location(), Some(SourceLocation::new(12, 0)));
    }

    #[test]
    fn test_abort_is_recognised() {
        assert!(ExecError::Aborted { line: 3 }.is_abort());
        assert!(!ExecError::NoCodeAtLine { line: 3 }.is_abort());
    }
}
