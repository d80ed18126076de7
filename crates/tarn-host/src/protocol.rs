//! Wire messages exchanged with clients.
//!
//! Each message is one JSON object per line whose `type` field carries the
//! tag, e.g. `{"type":"QUEUE_UPDATE","position":1}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tarn_types::ScriptError;

use crate::error::HostResult;

/// A job's files, by flat file name.
pub type FileMap = BTreeMap<String, String>;

/// Messages a client sends to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Submit a job.
    Run { files: FileMap, entrypoint: String },
    /// Answer the running job's input request.
    Input { key: String, text: String },
    /// Cancel a queued or running job.
    Stop { key: String },
}

impl ClientMessage {
    /// Parse one inbound line. Unknown tags and missing fields are errors.
    pub fn decode(line: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(line)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            ClientMessage::Run { .. } => "RUN",
            ClientMessage::Input { .. } => "INPUT",
            ClientMessage::Stop { .. } => "STOP",
        }
    }
}

/// Messages the host sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// The job was accepted at the given zero-based position.
    Queued { key: String, position: usize },
    QueueUpdate { position: usize },
    /// Liveness probe sent before each run cycle.
    Ping,
    Running,
    /// The running job is waiting for an `INPUT` reply.
    Input,
    Output { text: String, end: String },
    Error { text: String, end: String },
    /// The job is over; these are its files.
    Success { files: FileMap },
}

impl ServerMessage {
    /// The `ERROR` message reporting a job's error.
    pub fn error(err: &ScriptError) -> Self {
        ServerMessage::Error {
            text: err.to_string(),
            end: "\n".to_string(),
        }
    }

    /// Serialize to a single line, without the trailing newline.
    pub fn encode(&self) -> HostResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
