//! Shared types for Tarn script.
//!
//! This crate defines the AST node types, source spans and the error type
//! shared by the lexer, parser, evaluator and job host.

mod error;
mod span;
pub mod ast;

pub use error::{ErrorCategory, ScriptError};
pub use span::{SourceFile, Span};

/// Result type used by the lexer and parser.
pub type Result<T> = std::result::Result<T, ScriptError>;
