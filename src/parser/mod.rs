//! C source code parser
//!
//! This module turns C source text into hole-aware parse trees:
//! - [`lexer`]: Tokenization (source text → span-carrying tokens)
//! - [`peg`]: The grammar engine (ordered choice, balanced holes, precedence climbing)
//! - [`grammar`]: Statement-level control-flow grammar
//! - [`expressions`] / [`declarations`]: Expression and declaration grammars
//! - [`ast`]: Parse-tree and typed expression definitions
//!
//! # Parsing With Holes
//!
//! Nothing here tries to understand all of C. Statement parsing only looks
//! at control-flow structure and leaves conditions, bodies and ordinary
//! lines as balanced holes. Holes are parsed further only when a later phase
//! needs to know what is inside them.

pub mod ast;
pub mod declarations;
pub mod expressions;
pub mod grammar;
pub mod lexer;
pub mod parse;
pub mod peg;

pub use ast::{Expr, ExprKind, ParseNode, SimpleStatement, SourceLocation, Span};
pub use lexer::{reconstruct, tokenize, LexError, Token, TokenKind};
pub use parse::Parser;
pub use peg::ParseError;
