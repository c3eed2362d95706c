//! Errors surfaced to users of the library

use crate::interpreter::ExecError;
use crate::parser::ast::SourceLocation;
use crate::parser::lexer::LexError;
use crate::parser::ParseError;
use crate::rewrite::RewriteError;
use thiserror::Error;

/// Failure to turn a source file into a runnable translation unit
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error("{message} at {location}")]
    Structure {
        message: String,
        location: SourceLocation,
    },

    #[error("Undefined label '{label}' in {function} (line {line})")]
    UndefinedLabel {
        label: String,
        function: String,
        line: usize,
    },

    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            LoadError::Lex(e) => Some(e.location()),
            LoadError::Parse(e) => Some(e.location()),
            LoadError::Rewrite(e) => e.location(),
            LoadError::Structure { location, .. } => Some(*location),
            LoadError::UndefinedLabel { line, .. } => Some(SourceLocation::new(*line, 0)),
            LoadError::Io { .. } => None,
        }
    }
}

/// Failure of code typed at the shell (`xc`, `eval_c`, `exec_c`)
#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("Placeholder {{{index}}} has no argument ({given} given)")]
    MissingArgument { index: usize, given: usize },
}

impl From<LexError> for EvalError {
    fn from(err: LexError) -> Self {
        EvalError::Load(err.into())
    }
}

impl From<ParseError> for EvalError {
    fn from(err: ParseError) -> Self {
        EvalError::Load(err.into())
    }
}
