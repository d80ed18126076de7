use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which stage of a job produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Lexer or parser failure. Evaluation never starts.
    Syntax,
    /// Evaluator failure. Aborts the rest of the program.
    Runtime,
    /// The job exceeded its wall-clock limit.
    Timeout,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "Syntax"),
            Self::Runtime => write!(f, "Runtime"),
            Self::Timeout => write!(f, "Timeout"),
        }
    }
}

/// The single error reported for a job.
///
/// Rendered for the client as `[line N] Syntax error: message`, or without
/// the line prefix when there is no location (timeouts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptError {
    pub category: ErrorCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub message: String,
}

impl ScriptError {
    /// A syntax error at the given span.
    pub fn syntax(span: Span, message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Syntax,
            line: Some(span.line),
            message: message.into(),
        }
    }

    /// A runtime error, optionally located.
    pub fn runtime(line: Option<u32>, message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Runtime,
            line,
            message: message.into(),
        }
    }

    /// An unlocated timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Timeout,
            line: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "[line {line}] {} error: {}", self.category, self.message),
            None => write!(f, "{} error: {}", self.category, self.message),
        }
    }
}

impl std::error::Error for ScriptError {}
