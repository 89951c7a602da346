//! Plasma client node - entry point.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod config;

use app::PlasmaClient;
use config::ClientConfig;

/// Plasma chain client.
#[derive(Parser, Debug)]
#[command(name = "plasma-node")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "plasma.toml")]
    config: PathBuf,

    /// Data directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Anchor JSON-RPC endpoint
    #[arg(long)]
    ethereum_endpoint: Option<String>,

    /// Debug log filter (tracing EnvFilter syntax)
    #[arg(long)]
    debug: Option<String>,

    /// Log level used when no debug filter is set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Run against in-memory storage
    #[arg(long)]
    memory_storage: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ClientConfig::load(&args.config, &args)?;

    let filter = match &config.debug {
        Some(filter) => EnvFilter::try_new(filter)?,
        None => EnvFilter::try_new(&args.log_level)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("Starting plasma client v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {:?}", config.data_dir);
    info!("Anchor endpoint: {}", config.ethereum_endpoint);
    if let Some(name) = &config.plasma_chain_name {
        info!("Plasma chain: {}", name);
    }

    let client = PlasmaClient::new(config)?;
    client.start()?;

    tokio::signal::ctrl_c().await.ok();
    info!("Shutdown signal received");
    client.stop();

    Ok(())
}
