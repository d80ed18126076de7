//! The scheduler: one task owning the queue, the rendezvous slot and the
//! workspace, running one job at a time.
//!
//! Connections talk to it through a [`SchedulerHandle`]. While the queue is
//! empty it sleeps on the command channel; otherwise it runs cycles:
//!
//! 1. `PING` every queued peer and prune the unreachable ones
//! 2. send `QUEUE_UPDATE` to every job behind the head
//! 3. run the head job to a terminal state and remove it

use std::time::Duration;

use tarn_eval::Completion;
use tarn_types::{ScriptError, SourceFile};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::console::JobEvent;
use crate::error::{HostError, HostResult};
use crate::peer::{Peer, PeerId};
use crate::protocol::{FileMap, ServerMessage};
use crate::queue::{ExecutionQueue, Job, JobKey};
use crate::rendezvous::Rendezvous;
use crate::runner::{spawn_job, RunningJob};
use crate::workspace::Workspace;

/// Instructions from connections to the scheduler.
#[derive(Debug)]
pub enum Command {
    Submit {
        peer: Peer,
        files: FileMap,
        entrypoint: String,
    },
    Input {
        key: String,
        text: String,
    },
    Stop {
        key: String,
    },
    /// The peer's connection closed.
    Disconnected {
        peer: PeerId,
    },
}

/// Cloneable sender side of the scheduler's command channel.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SchedulerHandle {
    pub fn send(&self, command: Command) -> HostResult<()> {
        self.tx.send(command).map_err(|_| HostError::SchedulerClosed)
    }

    pub fn submit(&self, peer: Peer, files: FileMap, entrypoint: String) -> HostResult<()> {
        self.send(Command::Submit {
            peer,
            files,
            entrypoint,
        })
    }

    pub fn input(&self, key: String, text: String) -> HostResult<()> {
        self.send(Command::Input { key, text })
    }

    pub fn stop(&self, key: String) -> HostResult<()> {
        self.send(Command::Stop { key })
    }

    pub fn disconnected(&self, peer: PeerId) -> HostResult<()> {
        self.send(Command::Disconnected { peer })
    }
}

/// Book-keeping for the job currently running.
struct ActiveJob {
    key: JobKey,
    peer: Peer,
    running: RunningJob,
    /// The peer's connection closed while the job ran.
    peer_lost: bool,
    timed_out: bool,
}

/// Owner of all queue and job state.
pub struct Scheduler {
    queue: ExecutionQueue,
    rendezvous: Rendezvous,
    workspace: Workspace,
    timeout: Duration,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Cleared once every [`SchedulerHandle`] is gone.
    accepting: bool,
}

impl Scheduler {
    pub fn new(workspace: Workspace, timeout: Duration) -> (Self, SchedulerHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        let scheduler = Self {
            queue: ExecutionQueue::new(),
            rendezvous: Rendezvous::new(),
            workspace,
            timeout,
            commands,
            accepting: true,
        };
        (scheduler, SchedulerHandle { tx })
    }

    /// Serve commands and run jobs until every handle is dropped.
    pub async fn run(mut self) {
        info!(
            workspace = %self.workspace.root().display(),
            timeout_secs = self.timeout.as_secs_f64(),
            "scheduler started"
        );
        while self.accepting {
            if self.queue.is_empty() {
                match self.commands.recv().await {
                    Some(command) => self.handle_command(command, None),
                    None => self.accepting = false,
                }
                continue;
            }
            self.run_cycle().await;
        }
        info!("scheduler stopped");
    }

    // ══════════════════════════════════════════════════════════════════════
    // Commands
    // ══════════════════════════════════════════════════════════════════════

    fn handle_command(&mut self, command: Command, mut active: Option<&mut ActiveJob>) {
        match command {
            Command::Submit {
                peer,
                files,
                entrypoint,
            } => {
                let reply_to = peer.clone();
                let (key, position) = self.queue.enqueue(peer, files, entrypoint);
                info!(%key, position, "job queued");
                let reply = ServerMessage::Queued {
                    key: key.to_string(),
                    position,
                };
                if reply_to.send(reply).is_err() {
                    debug!(%key, "queued reply not delivered");
                }
            }
            Command::Input { key, text } => {
                if self.rendezvous.fulfil(&key, text) {
                    debug!(%key, "input delivered");
                } else {
                    debug!(%key, "ignoring input that nothing is waiting for");
                }
            }
            Command::Stop { key } => match self.queue.position(&key) {
                Some(0) if active.as_ref().is_some_and(|job| job.key == *key) => {
                    info!(%key, "cancelling running job");
                    if let Some(job) = active {
                        job.running.interrupt.raise();
                    }
                    self.rendezvous.disarm();
                }
                Some(position) => {
                    info!(%key, position, "removing queued job");
                    self.queue.remove(&key);
                    self.queue.notify_positions();
                }
                None => debug!(%key, "stop for unknown job"),
            },
            Command::Disconnected { peer } => {
                if let Some(job) = active.as_mut().filter(|job| job.peer.id() == peer) {
                    info!(key = %job.key, "peer disconnected, abandoning running job");
                    job.peer_lost = true;
                    job.running.interrupt.raise();
                    self.rendezvous.disarm();
                }
                let removed = self.queue.remove_waiting(peer);
                if removed > 0 {
                    info!(peer, removed, "dropped queued jobs of disconnected peer");
                    self.queue.notify_positions();
                }
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Run cycle
    // ══════════════════════════════════════════════════════════════════════

    async fn run_cycle(&mut self) {
        let pruned = self.queue.ping_and_prune();
        if !pruned.is_empty() {
            info!(count = pruned.len(), "pruned jobs of unreachable peers");
        }
        self.queue.notify_positions();

        let Some(job) = self.queue.start_head() else {
            return;
        };
        self.run_job(job).await;
        self.rendezvous.disarm();
        if let Err(e) = self.workspace.clear().await {
            error!(error = %e, "failed to clear workspace");
        }
        self.queue.finish_head();
    }

    /// Take the head job from `RUNNING` to its terminal state.
    ///
    /// Host-side failures are reported to the client as a runtime error;
    /// the client still gets `SUCCESS` with whatever files are readable.
    async fn run_job(&mut self, job: Job) {
        let Job {
            key,
            peer,
            files,
            entrypoint,
        } = job;

        if peer.send(ServerMessage::Running).is_err() {
            info!(%key, "peer gone before the job started");
            return;
        }
        info!(%key, %entrypoint, "job running");

        let result = match self.execute(&key, &peer, &files, entrypoint).await {
            Ok(Some(result)) => result,
            Ok(None) => return,
            Err(e) => {
                error!(%key, error = %e, "job failed inside the host");
                Err(ScriptError::runtime(None, format!("host error: {e}")))
            }
        };

        if let Err(err) = result {
            info!(%key, %err, "job reported an error");
            // Delivery failures surface below as a lost peer
            let _ = peer.send(ServerMessage::error(&err));
        }

        let files = match self.workspace.collect().await {
            Ok(files) => files,
            Err(e) => {
                error!(%key, error = %e, "failed to collect job files");
                FileMap::new()
            }
        };
        if peer.send(ServerMessage::Success { files }).is_err() {
            info!(%key, "peer disconnected before results were delivered");
        } else {
            info!(%key, "job completed");
        }
    }

    /// Materialize the job's files and evaluate its entrypoint. `None` if
    /// the peer was lost and nothing more should be sent.
    async fn execute(
        &mut self,
        key: &JobKey,
        peer: &Peer,
        files: &FileMap,
        entrypoint: String,
    ) -> HostResult<Option<Result<(), ScriptError>>> {
        self.workspace.clear().await?;
        self.workspace.materialize(files).await?;

        let Some(source) = self.workspace.read(&entrypoint).await? else {
            return Ok(Some(Err(ScriptError::runtime(
                None,
                format!("entrypoint '{entrypoint}' not found"),
            ))));
        };
        let source_file = SourceFile::new(entrypoint, source);
        let running = spawn_job(source_file, peer.clone(), self.workspace.store())?;
        let active = ActiveJob {
            key: key.clone(),
            peer: peer.clone(),
            running,
            peer_lost: false,
            timed_out: false,
        };
        Ok(self.supervise(active).await)
    }

    /// Wait for the evaluation to finish while serving commands, input
    /// requests and the timeout. Returns `None` if the peer was lost and
    /// nothing more should be sent.
    async fn supervise(&mut self, mut active: ActiveJob) -> Option<Result<(), ScriptError>> {
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        let outcome = loop {
            tokio::select! {
                done = &mut active.running.done => break done,
                Some(event) = active.running.events.recv() => {
                    self.handle_event(event, &active);
                }
                command = self.commands.recv(), if self.accepting => match command {
                    Some(command) => self.handle_command(command, Some(&mut active)),
                    None => {
                        info!(key = %active.key, "shutting down, interrupting running job");
                        self.accepting = false;
                        active.running.interrupt.raise();
                        self.rendezvous.disarm();
                    }
                },
                _ = &mut deadline, if !active.timed_out => {
                    warn!(key = %active.key, "job timed out");
                    active.timed_out = true;
                    active.running.interrupt.raise();
                    self.rendezvous.disarm();
                }
            }
        };
        self.rendezvous.disarm();

        if active.peer_lost || !active.peer.is_connected() {
            info!(key = %active.key, "discarding job of disconnected peer");
            return None;
        }

        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(ScriptError::runtime(None, "evaluator stopped unexpectedly")),
        };
        Some(match result {
            Ok(Completion::Finished) => Ok(()),
            Ok(Completion::Interrupted) if active.timed_out => Err(ScriptError::timeout(format!(
                "Process exceeded {}s limit",
                self.timeout.as_secs_f64()
            ))),
            Ok(Completion::Interrupted) => {
                info!(key = %active.key, "job cancelled");
                Ok(())
            }
            Err(err) => Err(err),
        })
    }

    fn handle_event(&mut self, event: JobEvent, active: &ActiveJob) {
        match event {
            JobEvent::AwaitInput { reply } => {
                if active.running.interrupt.is_raised() {
                    // Dropping the reply wakes the evaluator as interrupted
                    return;
                }
                self.rendezvous.arm(active.key.clone(), reply);
                if active.peer.send(ServerMessage::Input).is_err() {
                    self.rendezvous.disarm();
                    active.running.interrupt.raise();
                }
                debug!(key = %active.key, "waiting for input");
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("queued", &self.queue.len())
            .field("rendezvous", &self.rendezvous)
            .field("workspace", &self.workspace.root())
            .field("timeout", &self.timeout)
            .finish()
    }
}
