#![forbid(unsafe_code)]
//! Mines blocks for a remote node and credits the rewards to one wallet

use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{info, warn};
use powledger::client::ApiClient;
use powledger::config::{load_config, DEFAULT_CONFIG_PATH};
use powledger::miner::Miner;
use powledger::wallet::Wallet;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Node URL, overrides `miner.server_url`
    #[arg(long)]
    server: Option<String>,
    /// Worker threads, overrides `miner.threads`
    #[arg(long)]
    threads: Option<usize>,
    /// Hex private key or WIF of the reward wallet, overrides `miner.beneficiary`
    #[arg(long)]
    key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?.miner;
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    if let Some(threads) = cli.threads {
        config.threads = threads.max(1);
    }

    let wallet = match cli.key.or(config.beneficiary.clone()) {
        Some(secret) => Wallet::recover(&secret)?,
        None => {
            let wallet = Wallet::create();
            warn!(
                wif = %wallet.to_wif(),
                "no beneficiary configured, mining to a fresh wallet; keep this key"
            );
            wallet
        }
    };

    let client = ApiClient::new(&config.server_url)?;
    let miner = Miner::new(client, wallet.address(), &config);
    info!(
        server = %config.server_url,
        threads = config.threads,
        beneficiary = %miner.beneficiary(),
        "miner starting"
    );

    let shutdown = miner.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("stopping after the current round");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    miner.run().await?;
    Ok(())
}
