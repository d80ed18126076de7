//! FIFO execution queue.
//!
//! The head job is the only one ever run. It stays at position 0 while it
//! runs, so waiting jobs see positions 1, 2, ... and are removed from the
//! middle without disturbing each other's order.

use std::collections::VecDeque;
use std::fmt;

use rand::Rng;
use tracing::debug;

use crate::peer::{Peer, PeerId};
use crate::protocol::{FileMap, ServerMessage};

/// Length of a job key.
pub const KEY_LEN: usize = 10;

const KEY_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Identifies a job to its client, e.g. `Q7K2M0ZC4B`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey(String);

impl JobKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for JobKey {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// A random `[A-Z0-9]` key.
fn random_key() -> JobKey {
    let mut rng = rand::thread_rng();
    let key = (0..KEY_LEN)
        .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
        .collect();
    JobKey(key)
}

/// A submitted job.
#[derive(Debug, Clone)]
pub struct Job {
    pub key: JobKey,
    pub peer: Peer,
    pub files: FileMap,
    pub entrypoint: String,
}

/// Pending jobs in submission order.
#[derive(Debug, Default)]
pub struct ExecutionQueue {
    jobs: VecDeque<Job>,
}

impl ExecutionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Append a job; returns its key and zero-based position.
    pub fn enqueue(&mut self, peer: Peer, files: FileMap, entrypoint: String) -> (JobKey, usize) {
        let key = self.fresh_key();
        self.jobs.push_back(Job {
            key: key.clone(),
            peer,
            files,
            entrypoint,
        });
        (key, self.jobs.len() - 1)
    }

    fn fresh_key(&self) -> JobKey {
        loop {
            let key = random_key();
            if self.position(key.as_str()).is_none() {
                return key;
            }
        }
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.jobs.iter().position(|job| job.key == *key)
    }

    pub fn head(&self) -> Option<&Job> {
        self.jobs.front()
    }

    /// Hand out the head job's contents for running. The head keeps its
    /// place (with its files taken) until [`ExecutionQueue::finish_head`].
    pub fn start_head(&mut self) -> Option<Job> {
        let head = self.jobs.front_mut()?;
        Some(Job {
            key: head.key.clone(),
            peer: head.peer.clone(),
            files: std::mem::take(&mut head.files),
            entrypoint: head.entrypoint.clone(),
        })
    }

    /// Drop the head after it reached a terminal state.
    pub fn finish_head(&mut self) -> Option<Job> {
        self.jobs.pop_front()
    }

    /// Remove the job with `key`, wherever it is.
    pub fn remove(&mut self, key: &str) -> Option<Job> {
        let index = self.position(key)?;
        self.jobs.remove(index)
    }

    /// Remove the waiting jobs submitted by `peer`, leaving the head alone.
    /// Returns how many were removed.
    pub fn remove_waiting(&mut self, peer: PeerId) -> usize {
        let before = self.jobs.len();
        let mut index = 0;
        self.jobs.retain(|job| {
            index += 1;
            index == 1 || job.peer.id() != peer
        });
        before - self.jobs.len()
    }

    /// `PING` every queued peer and drop the jobs of those that are gone.
    /// Returns the keys of the pruned jobs.
    pub fn ping_and_prune(&mut self) -> Vec<JobKey> {
        let mut pruned = Vec::new();
        self.jobs.retain(|job| {
            if job.peer.send(ServerMessage::Ping).is_ok() {
                true
            } else {
                pruned.push(job.key.clone());
                false
            }
        });
        pruned
    }

    /// Tell every job behind the head its current position.
    pub fn notify_positions(&self) {
        for (position, job) in self.jobs.iter().enumerate().skip(1) {
            if job.peer.send(ServerMessage::QueueUpdate { position }).is_err() {
                debug!(key = %job.key, "position update not delivered");
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn submit(queue: &mut ExecutionQueue) -> (JobKey, usize, UnboundedReceiver<ServerMessage>) {
        let (peer, rx) = Peer::channel();
        let (key, position) = queue.enqueue(peer, FileMap::new(), "main.tarn".into());
        (key, position, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_key_format() {
        for _ in 0..100 {
            let key = random_key();
            assert_eq!(key.as_str().len(), KEY_LEN);
            assert!(key
                .as_str()
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_positions_follow_submission_order() {
        let mut queue = ExecutionQueue::new();
        let (a, pa, _ra) = submit(&mut queue);
        let (b, pb, _rb) = submit(&mut queue);
        let (c, pc, _rc) = submit(&mut queue);
        assert_eq!((pa, pb, pc), (0, 1, 2));
        assert_ne!(a, b);
        assert_eq!(queue.position(c.as_str()), Some(2));
        assert_eq!(queue.head().map(|j| &j.key), Some(&a));
    }

    #[test]
    fn test_remove_keeps_relative_order() {
        let mut queue = ExecutionQueue::new();
        let (a, ..) = submit(&mut queue);
        let (b, ..) = submit(&mut queue);
        let (c, ..) = submit(&mut queue);
        assert!(queue.remove(b.as_str()).is_some());
        assert!(queue.remove("NOSUCHKEY0").is_none());
        let keys: Vec<_> = queue.iter().map(|j| j.key.clone()).collect();
        assert_eq!(keys, vec![a, c]);
    }

    #[test]
    fn test_notify_positions_skips_head() {
        let mut queue = ExecutionQueue::new();
        let (_, _, mut ra) = submit(&mut queue);
        let (_, _, mut rb) = submit(&mut queue);
        let (_, _, mut rc) = submit(&mut queue);
        queue.notify_positions();
        assert!(drain(&mut ra).is_empty());
        assert_eq!(drain(&mut rb), vec![ServerMessage::QueueUpdate { position: 1 }]);
        assert_eq!(drain(&mut rc), vec![ServerMessage::QueueUpdate { position: 2 }]);
    }

    #[test]
    fn test_ping_prunes_unreachable_peers() {
        let mut queue = ExecutionQueue::new();
        let (_, _, mut ra) = submit(&mut queue);
        let (b, _, rb) = submit(&mut queue);
        let (c, _, _rc) = submit(&mut queue);
        drop(rb);
        assert_eq!(queue.ping_and_prune(), vec![b]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.position(c.as_str()), Some(1));
        assert_eq!(drain(&mut ra), vec![ServerMessage::Ping]);
    }

    #[test]
    fn test_start_head_takes_files_but_keeps_place() {
        let mut queue = ExecutionQueue::new();
        let (peer, _rx) = Peer::channel();
        let mut files = FileMap::new();
        files.insert("main.tarn".into(), "print(1)".into());
        let (key, _) = queue.enqueue(peer, files, "main.tarn".into());

        let job = queue.start_head().unwrap();
        assert_eq!(job.key, key);
        assert_eq!(job.files.len(), 1);
        assert_eq!(queue.position(key.as_str()), Some(0));
        assert!(queue.head().unwrap().files.is_empty());

        assert_eq!(queue.finish_head().map(|j| j.key), Some(key));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_waiting_keeps_head() {
        let mut queue = ExecutionQueue::new();
        let (peer, _rx) = Peer::channel();
        let (head, _) = queue.enqueue(peer.clone(), FileMap::new(), "a".into());
        let (other, _, _ro) = submit(&mut queue);
        queue.enqueue(peer.clone(), FileMap::new(), "b".into());
        assert_eq!(queue.remove_waiting(peer.id()), 1);
        let keys: Vec<_> = queue.iter().map(|j| j.key.clone()).collect();
        assert_eq!(keys, vec![head, other]);
    }
}
