//! Tarn parser: converts a token stream into an AST.

mod parse_expr;
mod parse_stmt;
mod parser;

pub use parser::{Parser, MAX_NESTING_DEPTH};

use tarn_lexer::Lexer;
use tarn_types::ast::Program;
use tarn_types::{Result, SourceFile};

/// Lex and parse a source file in one step.
pub fn parse_source(source_file: &SourceFile) -> Result<Program> {
    let tokens = Lexer::new(source_file).lex()?;
    Parser::new(tokens).parse()
}
