use serde::{Deserialize, Serialize};
use std::fmt;

/// Source position of a token or AST node.
///
/// Line and column are 1-based. Errors only ever report the line; the
/// column is kept for diagnostics in logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl Span {
    /// Create a new span.
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }

    /// The earlier of two spans. Used when a node covers several tokens.
    pub fn min(self, other: Span) -> Span {
        if (other.line, other.col) < (self.line, self.col) {
            other
        } else {
            self
        }
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A named script held in memory, as materialized from a job's file map.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub source: String,
}

impl SourceFile {
    /// Create a new source file.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Number of lines, counting a trailing partial line.
    pub fn line_count(&self) -> usize {
        self.source.split('\n').count()
    }
}
