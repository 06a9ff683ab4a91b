//! Configuration management for powledger

use crate::error::ChainError;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub miner: MinerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Consensus parameters. Every node serving the same chain must agree on these.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChainConfig {
    /// Leading zero bits required of a block hash.
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    /// Mempool transactions offered per block template.
    #[serde(default = "default_tx_per_block")]
    pub tx_per_block: usize,
    /// Minimum fee a regular transaction must pay.
    #[serde(default)]
    pub fee_per_tx: i64,
    #[serde(default = "default_mempool_capacity")]
    pub mempool_capacity: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            tx_per_block: default_tx_per_block(),
            fee_per_tx: 0,
            mempool_capacity: default_mempool_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Hex private key or WIF of the wallet credited with rewards.
    #[serde(default)]
    pub beneficiary: Option<String>,
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default = "default_poll_interval", with = "humantime_duration")]
    pub poll_interval: Duration,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            beneficiary: None,
            threads: default_threads(),
            poll_interval: default_poll_interval(),
        }
    }
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_difficulty() -> u32 {
    12
}

fn default_tx_per_block() -> usize {
    10
}

fn default_mempool_capacity() -> usize {
    10_000
}

fn default_server_url() -> String {
    format!("http://{}:{}", default_host(), default_port())
}

fn default_threads() -> usize {
    1
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

impl Config {
    pub fn from_toml(raw: &str) -> Result<Self, ChainError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ChainError> {
        if self.server.port == 0 {
            return Err(ChainError::ConfigError("server.port must be non-zero".into()));
        }
        if self.chain.tx_per_block == 0 {
            return Err(ChainError::ConfigError("chain.tx_per_block must be at least 1".into()));
        }
        if self.chain.difficulty > 255 {
            return Err(ChainError::ConfigError("chain.difficulty must be at most 255".into()));
        }
        if self.chain.fee_per_tx < 0 {
            return Err(ChainError::ConfigError("chain.fee_per_tx cannot be negative".into()));
        }
        if self.chain.mempool_capacity == 0 {
            return Err(ChainError::ConfigError("chain.mempool_capacity must be at least 1".into()));
        }
        if self.miner.threads == 0 {
            return Err(ChainError::ConfigError("miner.threads must be at least 1".into()));
        }
        Ok(())
    }
}

/// Loads `path`, falling back to defaults when the file does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ChainError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(path)?;
    Config::from_toml(&raw)
}
