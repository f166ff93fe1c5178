//! HTTP request distributor.
//!
//! ```text
//!     Client ──▶ listener ──▶ rate limit ──▶ round robin ──▶ Backend
//!                               │ 429          │ 503           │ 502 + re-probe
//!                               ▼              ▼               ▼
//!                                   health monitor (periodic sweep)
//! ```

use std::path::PathBuf;

use clap::Parser;
use distributor::config::load_config;
use distributor::lifecycle::{self, signals, Shutdown};
use distributor::observability::logging;

#[derive(Parser)]
#[command(name = "distributor")]
#[command(about = "Round-robin HTTP request distributor with health checks and rate limiting", long_about = None)]
struct Cli {
    /// Path to the TOML (or legacy JSON) configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    logging::init_logging(&config.observability);

    if cli.check {
        println!("{}: configuration ok", cli.config.display());
        return Ok(());
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        backends = config.backends.len(),
        bind_address = %config.bind_address(),
        rate_limit = config.rate_limit.enabled,
        "distributor starting"
    );

    let shutdown = Shutdown::new();
    let running = lifecycle::start(config, &shutdown).await?;

    signals::wait_for_signal().await;
    shutdown.trigger();
    running.stopped().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
