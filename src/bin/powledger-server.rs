#![forbid(unsafe_code)]
//! Coordination server: owns the chain and serves the REST API

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use powledger::api::{run_api_server, Node};
use powledger::blockchain::Blockchain;
use powledger::config::{load_config, DEFAULT_CONFIG_PATH};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Overrides `server.port`
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let host: IpAddr = config
        .server
        .host
        .parse()
        .map_err(|e| format!("invalid server.host {}: {}", config.server.host, e))?;
    let addr = SocketAddr::new(host, config.server.port);

    let blockchain = Blockchain::new(config.chain.clone());
    info!(
        difficulty = config.chain.difficulty,
        tx_per_block = config.chain.tx_per_block,
        fee_per_tx = config.chain.fee_per_tx,
        genesis = %blockchain.last_block().hash,
        "starting powledger node"
    );

    run_api_server(Arc::new(Node::new(blockchain)), addr).await
}
