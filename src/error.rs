//! Error types for powledger

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    // Key material
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),
    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    // Inputs and outputs
    #[error("Input is not signed")]
    MissingSignature,
    #[error("Input does not reference a previous transaction")]
    MissingPreviousTx,
    #[error("Amount {0} must be at least 1")]
    NonPositiveAmount(i64),
    #[error("Signature does not verify against {0}")]
    BadSignature(String),

    // Transactions
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
    #[error("Outputs are invalid: {0}")]
    InvalidOutputs(String),
    #[error("Inputs are invalid: {0}")]
    InvalidInputs(String),
    #[error("Insufficient inputs: inputs total {inputs}, outputs total {outputs}")]
    InsufficientInputs { inputs: i64, outputs: i64 },
    #[error("Output does not reference its owning transaction {0}")]
    OutputTxMismatch(String),
    #[error("Reward {amount} exceeds the allowed maximum {max}")]
    ExcessiveReward { amount: i64, max: i64 },
    #[error("Fee {fee} is below the required {required}")]
    FeeTooLow { fee: i64, required: i64 },
    #[error("Fee transactions can only be created by miners")]
    UnexpectedFeeTransaction,

    // Blocks
    #[error("Index mismatch: expected {expected}, got {actual}")]
    IndexMismatch { expected: u64, actual: u64 },
    #[error("Previous hash mismatch: expected {expected}, got {actual}")]
    PreviousHashMismatch { expected: String, actual: String },
    #[error("Block must contain exactly one fee transaction, found {0}")]
    NoFeeTransaction(usize),
    #[error("Fee transaction pays {0} instead of the block's miner")]
    FeeNotToMiner(String),
    #[error("Hash {0} does not meet the difficulty target")]
    DifficultyNotMet(String),
    #[error("Double spend detected: {0}")]
    DoubleSpendDetected(String),

    // Chain and mempool
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(Box<ChainError>),
    #[error("Invalid block: {0}")]
    InvalidBlock(Box<ChainError>),
    #[error("Invalid chain at block {index}: {source}")]
    InvalidChain {
        index: u64,
        #[source]
        source: Box<ChainError>,
    },
    #[error("Pending transaction already exists: {0}")]
    PendingTransactionExists(String),
    #[error("Transaction {0} is already part of the chain")]
    DuplicateTransaction(String),
    #[error("Mempool is full")]
    MempoolFull,
    #[error("Rejected by node: {0}")]
    Rejected(String),

    // Mining
    #[error("Mining error: {0}")]
    MiningError(String),

    // Plumbing
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("IO error: {0}")]
    IoError(String),
}

impl ChainError {
    /// Wraps a validation failure as a rejected transaction.
    pub fn invalid_transaction(inner: ChainError) -> Self {
        ChainError::InvalidTransaction(Box::new(inner))
    }

    /// Wraps a validation failure as a rejected block.
    pub fn invalid_block(inner: ChainError) -> Self {
        ChainError::InvalidBlock(Box::new(inner))
    }

    /// The innermost reason, skipping any wrapping variants.
    pub fn root_cause(&self) -> &ChainError {
        match self {
            ChainError::InvalidTransaction(inner) | ChainError::InvalidBlock(inner) => {
                inner.root_cause()
            }
            ChainError::InvalidChain { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::ConfigError(err.to_string())
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        ChainError::NetworkError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
