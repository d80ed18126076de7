//! Runtime error types for the Tarn evaluator.

use thiserror::Error;

use crate::io::Interrupted;
use crate::value::Value;

/// Evaluation error — runtime traps plus the internal control-flow signals.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    /// Read or `set` of a name that no enclosing scope defines.
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),
    /// Operand or argument of the wrong type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// Division by zero, non-finite results.
    #[error("{0}")]
    ArithmeticTrap(String),
    #[error("{name}() expects {expected} argument(s), got {got}")]
    ArityMismatch {
        name: String,
        expected: String,
        got: usize,
    },
    #[error("value of type {0} is not callable")]
    NotCallable(&'static str),
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: String, len: usize },
    #[error("maximum call depth of {0} exceeded")]
    CallDepthExceeded(u32),
    #[error("lists nested deeper than {0} levels")]
    NestingTooDeep(usize),
    /// A builtin rejected its input.
    #[error("{0}")]
    Builtin(String),
    /// The workspace refused a file operation.
    #[error("file error: {0}")]
    File(String),
    /// `return` statement (used internally for control flow).
    #[error("'return' outside of a function")]
    Return(Value),
    /// The job was stopped or timed out (used internally for control flow).
    #[error("evaluation interrupted")]
    Interrupted,
}

impl From<Interrupted> for EvalError {
    fn from(_: Interrupted) -> Self {
        EvalError::Interrupted
    }
}

/// Result alias for evaluator operations.
pub type EvalResult<T> = Result<T, EvalError>;
