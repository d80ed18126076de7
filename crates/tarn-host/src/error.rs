//! Host-level error types.

use thiserror::Error;

/// Failures inside the host itself. Script errors are never `HostError`s;
/// they are reported to the job's peer as `ERROR` messages.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    /// The scheduler task is gone; no more commands can be delivered.
    #[error("scheduler has shut down")]
    SchedulerClosed,
}

pub type HostResult<T> = Result<T, HostError>;
