// Thin re-export module: the ledger lives in `blockchain/core.rs`, split into
// chain management, UTXO state and history validation.

pub mod core;
pub use core::*;
