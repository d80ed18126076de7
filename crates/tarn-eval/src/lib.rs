//! Tarn tree-walking evaluator.
//!
//! Executes Tarn programs directly from the AST. All effects go through
//! capabilities supplied per run: [`Io`] for the peer's console,
//! [`FileStore`] for the job's files and [`Interrupt`] for cancellation.

mod builtins;
pub mod env;
pub mod error;
pub mod evaluator;
pub mod io;
pub mod value;

pub use builtins::{Builtin, MAX_RANGE_LEN};
pub use env::Environment;
pub use error::{EvalError, EvalResult};
pub use evaluator::{Interpreter, MAX_CALL_DEPTH};
pub use io::{is_safe_file_name, FileStore, Interrupt, Interrupted, Io, MemoryFiles};
pub use value::{Value, MAX_LIST_DEPTH};

use tarn_types::{ScriptError, SourceFile};

/// How a run that raised no error ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The program ran to its end.
    Finished,
    /// The interrupt was raised before the program ended.
    Interrupted,
}

/// Lex, parse and evaluate one source file.
///
/// Evaluation starts only if the whole file lexes and parses; the first
/// syntax error is returned instead.
pub fn run(
    source_file: &SourceFile,
    io: &mut dyn Io,
    files: &mut dyn FileStore,
    interrupt: &Interrupt,
) -> Result<Completion, ScriptError> {
    let program = tarn_parser::parse_source(source_file)?;
    Interpreter::new(io, files, interrupt.clone()).run(&program)
}
