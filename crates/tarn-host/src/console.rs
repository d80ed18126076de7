//! The running job's console: the evaluator's [`Io`] bound to one peer.

use tarn_eval::{Interrupt, Interrupted, Io};
use tokio::sync::{mpsc, oneshot};

use crate::peer::Peer;
use crate::protocol::ServerMessage;

/// Requests from the evaluator thread to the scheduler.
#[derive(Debug)]
pub enum JobEvent {
    /// The program called `input`; answer on `reply`.
    AwaitInput { reply: oneshot::Sender<String> },
}

/// [`Io`] for a job. Output goes straight to the peer; input goes through
/// the scheduler's rendezvous.
pub struct PeerConsole {
    peer: Peer,
    events: mpsc::UnboundedSender<JobEvent>,
    interrupt: Interrupt,
}

impl PeerConsole {
    pub fn new(peer: Peer, events: mpsc::UnboundedSender<JobEvent>, interrupt: Interrupt) -> Self {
        Self {
            peer,
            events,
            interrupt,
        }
    }
}

impl Io for PeerConsole {
    fn emit(&mut self, text: &str, end: &str) {
        let msg = ServerMessage::Output {
            text: text.to_string(),
            end: end.to_string(),
        };
        // A lost peer abandons the job
        if self.peer.send(msg).is_err() {
            self.interrupt.raise();
        }
    }

    /// Blocks the evaluator thread until the scheduler answers or drops
    /// the request.
    fn request_input(&mut self) -> Result<String, Interrupted> {
        let (reply, answer) = oneshot::channel();
        self.events
            .send(JobEvent::AwaitInput { reply })
            .map_err(|_| Interrupted)?;
        answer.blocking_recv().map_err(|_| Interrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_sends_output() {
        let (peer, mut rx) = Peer::channel();
        let (events, _events_rx) = mpsc::unbounded_channel();
        let mut console = PeerConsole::new(peer, events, Interrupt::new());
        console.emit("hi", "\n");
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerMessage::Output {
                text: "hi".into(),
                end: "\n".into()
            }
        );
    }

    #[test]
    fn test_emit_to_lost_peer_raises_interrupt() {
        let (peer, rx) = Peer::channel();
        drop(rx);
        let (events, _events_rx) = mpsc::unbounded_channel();
        let interrupt = Interrupt::new();
        let mut console = PeerConsole::new(peer, events, interrupt.clone());
        console.emit("lost", "");
        assert!(interrupt.is_raised());
    }

    #[test]
    fn test_request_input_round_trip() {
        let (peer, _rx) = Peer::channel();
        let (events, mut events_rx) = mpsc::unbounded_channel();
        let mut console = PeerConsole::new(peer, events, Interrupt::new());

        let answerer = std::thread::spawn(move || match events_rx.blocking_recv() {
            Some(JobEvent::AwaitInput { reply }) => reply.send("typed".to_string()).unwrap(),
            None => panic!("no input request"),
        });
        assert_eq!(console.request_input(), Ok("typed".to_string()));
        answerer.join().unwrap();
    }

    #[test]
    fn test_request_input_dropped_is_interrupted() {
        let (peer, _rx) = Peer::channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        drop(events_rx);
        let mut console = PeerConsole::new(peer, events, Interrupt::new());
        assert_eq!(console.request_input(), Err(Interrupted));
    }
}
