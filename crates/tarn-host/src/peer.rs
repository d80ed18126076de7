//! A connected client, as seen by the scheduler.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::protocol::ServerMessage;

/// Process-unique connection id.
pub type PeerId = u64;

static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(1);

/// Delivery failed: the peer's connection is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unreachable;

/// Outbound handle to one client. Cheap to clone; every clone feeds the same
/// connection writer.
#[derive(Debug, Clone)]
pub struct Peer {
    id: PeerId,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl Peer {
    /// A new peer and the receiving end its connection writer drains.
    pub fn channel() -> (Peer, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = NEXT_PEER_ID.fetch_add(1, Ordering::Relaxed);
        (Peer { id, tx }, rx)
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Queue a message for the peer without waiting for it to be written.
    pub fn send(&self, msg: ServerMessage) -> Result<(), Unreachable> {
        self.tx.send(msg).map_err(|_| Unreachable)
    }

    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}
