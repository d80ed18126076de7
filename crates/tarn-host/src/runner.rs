//! Starts a job's evaluation on its own thread.
//!
//! The evaluator is synchronous and recursive, so it runs on a dedicated
//! thread with a large stack. The scheduler talks to it through channels:
//! `events` carries input requests, `done` the final result.

use tarn_eval::{run, Completion, Interrupt};
use tarn_types::{ScriptError, SourceFile};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::console::{JobEvent, PeerConsole};
use crate::error::HostResult;
use crate::peer::Peer;
use crate::workspace::WorkspaceFiles;

/// Stack size of the evaluator thread.
pub const EVAL_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Handles to an evaluation in flight.
#[derive(Debug)]
pub struct RunningJob {
    pub interrupt: Interrupt,
    pub events: mpsc::UnboundedReceiver<JobEvent>,
    /// Dropped without a value if the evaluator thread panicked.
    pub done: oneshot::Receiver<Result<Completion, ScriptError>>,
}

/// Spawn the evaluator for `source`, talking to `peer` and reading and
/// writing `files`.
pub fn spawn_job(source: SourceFile, peer: Peer, files: WorkspaceFiles) -> HostResult<RunningJob> {
    let interrupt = Interrupt::new();
    let (events_tx, events) = mpsc::unbounded_channel();
    let (done_tx, done) = oneshot::channel();

    let thread_interrupt = interrupt.clone();
    std::thread::Builder::new()
        .name("tarn-eval".into())
        .stack_size(EVAL_STACK_SIZE)
        .spawn(move || {
            let mut console = PeerConsole::new(peer, events_tx, thread_interrupt.clone());
            let mut files = files;
            let result = run(&source, &mut console, &mut files, &thread_interrupt);
            debug!(file = %source.name, ?result, "evaluation finished");
            // The scheduler may have given up on the job already
            let _ = done_tx.send(result);
        })?;

    Ok(RunningJob {
        interrupt,
        events,
        done,
    })
}
