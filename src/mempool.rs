//! Pending transactions awaiting inclusion in a block

use crate::error::ChainError;
use crate::transaction::Transaction;

pub const DEFAULT_MEMPOOL_CAPACITY: usize = 10_000;

/// Submission-ordered pool of pending transactions.
#[derive(Debug, Clone)]
pub struct Mempool {
    transactions: Vec<Transaction>,
    capacity: usize,
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

impl Mempool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMPOOL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Mempool {
            transactions: Vec::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Appends without validating; admission rules live in `Blockchain::add_transaction`.
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<(), ChainError> {
        if self.transactions.len() >= self.capacity {
            return Err(ChainError::MempoolFull);
        }
        self.transactions.push(tx);
        Ok(())
    }

    /// Removes the transaction with `hash`, returning it if present.
    pub fn remove_transaction(&mut self, hash: &str) -> Option<Transaction> {
        let position = self.position(hash)?;
        Some(self.transactions.remove(position))
    }

    pub fn position(&self, hash: &str) -> Option<usize> {
        self.transactions.iter().position(|tx| tx.hash == hash)
    }

    pub fn get_transaction(&self, hash: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| tx.hash == hash)
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.position(hash).is_some()
    }

    /// First pending transaction spending `previous_tx` for `address`.
    pub fn find_spender(&self, previous_tx: &str, address: &str) -> Option<&Transaction> {
        self.transactions
            .iter()
            .find(|tx| tx.spends(previous_tx, address))
    }

    /// Keeps only the transactions for which `keep` holds, returning the number dropped.
    pub fn retain(&mut self, keep: impl FnMut(&Transaction) -> bool) -> usize {
        let before = self.transactions.len();
        self.transactions.retain(keep);
        before - self.transactions.len()
    }

    /// The oldest `limit` transactions.
    pub fn head(&self, limit: usize) -> &[Transaction] {
        &self.transactions[..limit.min(self.transactions.len())]
    }

    pub fn get_all_transactions(&self) -> Vec<Transaction> {
        self.transactions.clone()
    }
}
