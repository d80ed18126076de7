//! Per-connection message loop.
//!
//! Inbound lines are decoded into scheduler commands; a writer task drains
//! the peer's outbox onto the stream. When the inbound side ends the peer
//! is reported disconnected.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::HostResult;
use crate::peer::Peer;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::scheduler::SchedulerHandle;

/// Serve one client until it disconnects.
pub async fn handle_connection<S>(stream: S, scheduler: SchedulerHandle)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (peer, outbox) = Peer::channel();
    let peer_id = peer.id();
    info!(peer = peer_id, "client connected");

    let writer_task = tokio::spawn(async move {
        if let Err(e) = write_messages(writer, outbox).await {
            debug!(peer = peer_id, error = %e, "writer stopped");
        }
    });

    let mut lines = BufReader::new(reader).split(b'\n');
    loop {
        match lines.next_segment().await {
            Ok(Some(line)) => {
                if !dispatch(&line, &peer, &scheduler) {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(peer = peer_id, error = %e, "read failed");
                break;
            }
        }
    }

    writer_task.abort();
    info!(peer = peer_id, "client disconnected");
    // Ignored when the host is shutting down
    let _ = scheduler.disconnected(peer_id);
}

/// Forward one inbound line. Returns `false` once the scheduler is gone.
fn dispatch(line: &[u8], peer: &Peer, scheduler: &SchedulerHandle) -> bool {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.iter().all(u8::is_ascii_whitespace) {
        return true;
    }
    let msg = match ClientMessage::decode(line) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(peer = peer.id(), error = %e, "ignoring malformed message");
            return true;
        }
    };
    info!(peer = peer.id(), tag = msg.tag(), "message received");

    let sent = match msg {
        ClientMessage::Run { files, entrypoint } => scheduler.submit(peer.clone(), files, entrypoint),
        ClientMessage::Input { key, text } => scheduler.input(key, text),
        ClientMessage::Stop { key } => scheduler.stop(key),
    };
    sent.is_ok()
}

async fn write_messages<W>(mut writer: W, mut outbox: mpsc::UnboundedReceiver<ServerMessage>) -> HostResult<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = outbox.recv().await {
        let mut line = msg.encode()?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
