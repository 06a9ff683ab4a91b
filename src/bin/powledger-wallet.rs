#![forbid(unsafe_code)]
//! Wallet CLI: create keys, inspect balances and send payments

use clap::{Parser, Subcommand};
use colored::*;
use powledger::client::ApiClient;
use powledger::config::{load_config, DEFAULT_CONFIG_PATH};
use powledger::wallet::Wallet;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Node URL, defaults to `miner.server_url`
    #[arg(long)]
    server: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generates a new wallet and prints its keys
    New,
    /// Prints the address and WIF of an existing key
    Show {
        /// Hex private key or WIF
        key: String,
    },
    /// Shows balance and unspent outputs of an address
    Balance {
        address: String,
    },
    /// Pays `amount` to `to`, spending the first unspent output that covers it
    Send {
        /// Hex private key or WIF of the sender
        #[arg(long)]
        key: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: i64,
        /// Defaults to the node's minimum fee
        #[arg(long)]
        fee: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let server = match cli.server {
        Some(server) => server,
        None => load_config(&cli.config)?.miner.server_url,
    };

    match cli.command {
        Commands::New => {
            let wallet = Wallet::create();
            println!("{}", "🔑 New wallet created".bright_green().bold());
            print_keys(&wallet);
            println!();
            println!("{}", "💡 Keep the private key secret; it cannot be recovered.".yellow());
        }
        Commands::Show { key } => {
            let wallet = Wallet::recover(&key)?;
            print_keys(&wallet);
        }
        Commands::Balance { address } => {
            let client = ApiClient::new(server)?;
            let summary = client.wallet(&address).await?;
            println!("{} {}", "Address:".bright_cyan(), address);
            println!("{} {}", "Balance:".bright_cyan(), summary.balance.to_string().bold());
            println!("{} {}", "Minimum fee:".bright_cyan(), summary.fee);
            if summary.utxo.is_empty() {
                println!("{}", "No unspent outputs".dimmed());
            }
            for output in &summary.utxo {
                println!(
                    "  {} {}",
                    output.amount.to_string().bright_white(),
                    output.tx.as_deref().unwrap_or("?").dimmed()
                );
            }
        }
        Commands::Send {
            key,
            to,
            amount,
            fee,
        } => {
            let wallet = Wallet::recover(&key)?;
            let client = ApiClient::new(server)?;
            let summary = client.wallet(&wallet.address()).await?;
            let fee = fee.unwrap_or(summary.fee);

            let output = summary
                .utxo
                .iter()
                .find(|o| o.amount >= amount.saturating_add(fee))
                .ok_or_else(|| {
                    format!(
                        "no single unspent output covers {} plus fee {} (balance {})",
                        amount, fee, summary.balance
                    )
                })?;

            let tx = wallet.spend(output, &to, amount, fee)?;
            match client.submit_transaction(&tx).await {
                Ok(accepted) => {
                    println!("{}", "✅ Transaction submitted".bright_green().bold());
                    println!("{} {}", "Hash:".bright_cyan(), accepted.hash);
                }
                Err(e) => {
                    eprintln!("{} {}", "❌ Transaction rejected:".red().bold(), e);
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}

fn print_keys(wallet: &Wallet) {
    println!("{} {}", "Address:    ".bright_cyan(), wallet.address());
    println!("{} {}", "Private key:".bright_cyan(), wallet.private_key_hex());
    println!("{} {}", "WIF:        ".bright_cyan(), wallet.to_wif());
}
