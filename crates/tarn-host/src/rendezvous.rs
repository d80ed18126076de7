//! The single input slot between the running job and its peer.

use tokio::sync::oneshot;

use crate::queue::JobKey;

struct Armed {
    key: JobKey,
    reply: oneshot::Sender<String>,
}

/// Holds at most one pending input request, keyed to the running job.
///
/// Disarming drops the reply sender, which wakes the waiting evaluator with
/// an interrupt.
#[derive(Default)]
pub struct Rendezvous {
    slot: Option<Armed>,
}

impl Rendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the slot for `key`. A previous request, if any, is abandoned.
    pub fn arm(&mut self, key: JobKey, reply: oneshot::Sender<String>) {
        self.slot = Some(Armed { key, reply });
    }

    pub fn armed_key(&self) -> Option<&JobKey> {
        self.slot.as_ref().map(|armed| &armed.key)
    }

    pub fn is_armed(&self) -> bool {
        self.slot.is_some()
    }

    /// Deliver `text` if the slot is armed for `key`. Anything else is
    /// ignored and leaves the slot as it was.
    pub fn fulfil(&mut self, key: &str, text: String) -> bool {
        match self.slot.take() {
            Some(armed) if armed.key == *key => armed.reply.send(text).is_ok(),
            other => {
                self.slot = other;
                false
            }
        }
    }

    pub fn disarm(&mut self) {
        self.slot = None;
    }
}

impl std::fmt::Debug for Rendezvous {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rendezvous")
            .field("armed_key", &self.armed_key())
            .finish()
    }
}
