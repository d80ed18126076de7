//! TCP front-end.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::connection::handle_connection;
use crate::error::HostResult;
use crate::scheduler::SchedulerHandle;

/// Accepts clients and gives each its own connection task.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    scheduler: SchedulerHandle,
}

impl Server {
    pub async fn bind(addr: SocketAddr, scheduler: SchedulerHandle) -> HostResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, scheduler })
    }

    pub fn local_addr(&self) -> HostResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever.
    pub async fn serve(self) -> HostResult<()> {
        info!(addr = %self.local_addr()?, "listening");
        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                warn!(%addr, error = %e, "could not disable Nagle");
            }
            info!(%addr, "accepted connection");
            tokio::spawn(handle_connection(stream, self.scheduler.clone()));
        }
    }
}
