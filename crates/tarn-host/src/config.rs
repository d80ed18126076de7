//! Host configuration.
//!
//! Each setting comes from a command-line flag, else its `TARN_*`
//! environment variable, else the default.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

pub const DEFAULT_ADDR: &str = "127.0.0.1:5000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_WORKSPACE: &str = "tmp";

pub const ENV_ADDR: &str = "TARN_ADDR";
pub const ENV_TIMEOUT_SECS: &str = "TARN_TIMEOUT_SECS";
pub const ENV_WORKSPACE: &str = "TARN_WORKSPACE";

/// tarnd runs Tarn scripts submitted over TCP, one job at a time.
///
/// Logging is controlled by RUST_LOG (default: info).
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "tarnd", version, about, long_about = None)]
pub struct HostConfig {
    /// Address to listen on.
    #[arg(long = "addr", env = ENV_ADDR, default_value = DEFAULT_ADDR)]
    pub listen_addr: SocketAddr,

    /// Wall-clock limit for one job, in seconds.
    #[arg(
        long = "timeout",
        env = ENV_TIMEOUT_SECS,
        default_value_t = DEFAULT_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout_secs: u64,

    /// Scratch directory for the running job's files. Wiped between jobs.
    #[arg(long, env = ENV_WORKSPACE, default_value = DEFAULT_WORKSPACE)]
    pub workspace: PathBuf,
}

impl HostConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            workspace: PathBuf::from(DEFAULT_WORKSPACE),
        }
    }
}
