//! `tarnd`: the Tarn job host.

use clap::Parser;
use tarn_host::{logging, HostConfig};

#[tokio::main]
async fn main() {
    let config = HostConfig::parse();
    logging::init_tracing();

    if let Err(e) = tarn_host::serve(config).await {
        tracing::error!(error = %e, "host stopped");
        std::process::exit(1);
    }
}
