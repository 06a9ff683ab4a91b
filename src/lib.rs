//! powledger - A minimal proof-of-work UTXO ledger
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, the chain aggregate and UTXO state
//! - [`transaction`] - Transaction types and validation
//! - [`mempool`] - Pending transactions
//! - [`economics`] - Block reward schedule
//!
//! ## Mining
//! - [`miner`] - Proof-of-work search and the mining loop
//!
//! ## Cryptography & Wallets
//! - [`crypto`] - Hashing, keys and signatures (secp256k1)
//! - [`wallet`] - Keypair wallet, WIF import/export, spending helpers
//!
//! ## Networking
//! - [`api`] - REST coordination server
//! - [`client`] - HTTP client for miners and wallets
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod economics;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Mining
// ============================================================================
pub mod miner;

// ============================================================================
// Cryptography & Wallets
// ============================================================================
pub mod crypto;
pub mod wallet;

// ============================================================================
// Networking
// ============================================================================
pub mod api;
pub mod client;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
