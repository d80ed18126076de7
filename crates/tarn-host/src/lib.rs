//! Tarn job host.
//!
//! Accepts jobs over TCP, queues them, and runs them one at a time through
//! the Tarn evaluator while relaying their console to the submitting
//! client.
//!
//! # Protocol
//!
//! One JSON object per line; the `type` field is the tag.
//!
//! - client → host: `RUN {files, entrypoint}`, `INPUT {key, text}`, `STOP {key}`
//! - host → client: `QUEUED {key, position}`, `QUEUE_UPDATE {position}`,
//!   `PING`, `RUNNING`, `INPUT`, `OUTPUT {text, end}`, `ERROR {text, end}`,
//!   `SUCCESS {files}`

pub mod config;
pub mod connection;
pub mod console;
pub mod error;
pub mod logging;
pub mod peer;
pub mod protocol;
pub mod queue;
pub mod rendezvous;
pub mod runner;
pub mod scheduler;
pub mod server;
pub mod workspace;

pub use config::HostConfig;
pub use error::{HostError, HostResult};
pub use peer::{Peer, PeerId};
pub use protocol::{ClientMessage, FileMap, ServerMessage};
pub use scheduler::{Command, Scheduler, SchedulerHandle};
pub use server::Server;
pub use workspace::Workspace;

/// Run the host described by `config` until the listener fails.
pub async fn serve(config: HostConfig) -> HostResult<()> {
    let workspace = Workspace::open(&config.workspace).await?;
    let (scheduler, handle) = Scheduler::new(workspace, config.timeout());
    tokio::spawn(scheduler.run());
    Server::bind(config.listen_addr, handle).await?.serve().await
}
