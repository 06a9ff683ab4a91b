use crate::config::ChainConfig;
use crate::crypto::{sha256_hex, Address, HashHex};
use crate::economics::reward_for_difficulty;
use crate::error::ChainError;
use crate::mempool::Mempool;
use crate::transaction::{Transaction, TransactionOutput, TransactionType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use super::state::{UtxoState, WalletSummary};
use super::validation::{replay_chain, validate_against_history, validate_no_double_spend};

pub const GENESIS_TIMESTAMP: u64 = 1672531200000;
pub const GENESIS_ADDRESS: &str = "genesis";
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub previous_hash: HashHex,
    pub transactions: Vec<Transaction>,
    pub timestamp: u64,
    /// Address credited for mining this block.
    pub miner: Address,
    pub hash: HashHex,
    pub nonce: u64,
}

/// Everything a miner needs to assemble the next block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInfo {
    pub index: u64,
    pub previous_hash: HashHex,
    pub difficulty: u32,
    pub fee_per_tx: i64,
    pub transactions: Vec<Transaction>,
}

impl BlockInfo {
    pub fn collected_fees(&self) -> i64 {
        collected_fees(&self.transactions)
    }

    /// The most a fee transaction built on this template may claim.
    pub fn max_reward(&self) -> i64 {
        reward_for_difficulty(self.difficulty).saturating_add(self.collected_fees())
    }
}

fn collected_fees(transactions: &[Transaction]) -> i64 {
    transactions
        .iter()
        .filter(|tx| !tx.is_fee())
        .fold(0i64, |acc, tx| acc.saturating_add(tx.fee().max(0)))
}

impl Block {
    pub fn new(
        index: u64,
        previous_hash: HashHex,
        transactions: Vec<Transaction>,
        miner: Address,
    ) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis() as u64;
        let mut block = Block {
            index,
            previous_hash,
            transactions,
            timestamp,
            miner,
            hash: HashHex::new(),
            nonce: 0,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Unmined block on top of a template: a fee transaction paying
    /// `miner` the full allowance, followed by the template's transactions.
    pub fn from_block_info(info: &BlockInfo, miner: &str) -> Self {
        let mut transactions = Vec::with_capacity(info.transactions.len() + 1);
        transactions.push(Transaction::reward(miner, info.max_reward()));
        transactions.extend(info.transactions.iter().cloned());

        Block::new(
            info.index,
            info.previous_hash.clone(),
            transactions,
            miner.to_string(),
        )
    }

    /// `sha256(index + join(transactionHashes) + timestamp + previousHash + nonce + miner)`
    pub fn compute_hash(&self) -> HashHex {
        let tx_hashes: String = self.transactions.iter().map(|tx| tx.hash.as_str()).collect();
        sha256_hex(&[
            self.index.to_string().as_bytes(),
            tx_hashes.as_bytes(),
            self.timestamp.to_string().as_bytes(),
            self.previous_hash.as_bytes(),
            self.nonce.to_string().as_bytes(),
            self.miner.as_bytes(),
        ])
    }

    /// Target with `difficulty` leading zero bits and all other bits set.
    pub fn hash_to_target(difficulty: u32) -> [u8; 32] {
        let mut target = [0xFF; 32];
        let leading_zeros = (difficulty / 8).min(32);
        let partial_bits = difficulty % 8;

        for item in target.iter_mut().take(leading_zeros as usize) {
            *item = 0;
        }

        if leading_zeros < 32 && partial_bits > 0 {
            target[leading_zeros as usize] = 0xFF >> partial_bits;
        }
        target
    }

    /// Proof-of-work predicate over a hex hash.
    pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
        let mut bytes = [0u8; 32];
        if hex::decode_to_slice(hash, &mut bytes).is_err() {
            return false;
        }
        bytes <= Self::hash_to_target(difficulty)
    }

    /// Increments the nonce until the hash meets `difficulty`. Returns
    /// `false` without a valid hash if `cancel` is raised first.
    pub fn mine(&mut self, difficulty: u32, miner_address: &str, cancel: &AtomicBool) -> bool {
        self.miner = miner_address.to_string();
        loop {
            self.hash = self.compute_hash();
            if Self::meets_difficulty(&self.hash, difficulty) {
                return true;
            }
            if cancel.load(Ordering::Relaxed) {
                return false;
            }
            self.nonce = self.nonce.wrapping_add(1);
        }
    }

    pub fn fee_transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|tx| tx.is_fee())
    }

    /// Fees paid by the block's regular transactions.
    pub fn collected_fees(&self) -> i64 {
        collected_fees(&self.transactions)
    }

    /// Validates the block as the successor of (`previous_hash`, `previous_index`).
    pub fn is_valid(
        &self,
        previous_hash: &str,
        previous_index: u64,
        difficulty: u32,
        fee_per_tx: i64,
    ) -> Result<(), ChainError> {
        let expected_index = previous_index + 1;
        if self.index != expected_index {
            return Err(ChainError::IndexMismatch {
                expected: expected_index,
                actual: self.index,
            });
        }

        let expected_hash = self.compute_hash();
        if expected_hash != self.hash {
            return Err(ChainError::HashMismatch {
                expected: expected_hash,
                actual: self.hash.clone(),
            });
        }

        if self.previous_hash != previous_hash {
            return Err(ChainError::PreviousHashMismatch {
                expected: previous_hash.to_string(),
                actual: self.previous_hash.clone(),
            });
        }

        let fee_count = self.fee_transactions().count();
        if fee_count != 1 {
            return Err(ChainError::NoFeeTransaction(fee_count));
        }
        if let Some(output) = self
            .fee_transactions()
            .flat_map(|tx| &tx.tx_outputs)
            .find(|output| output.to_address != self.miner)
        {
            return Err(ChainError::FeeNotToMiner(output.to_address.clone()));
        }

        if !Self::meets_difficulty(&self.hash, difficulty) {
            return Err(ChainError::DifficultyNotMet(self.hash.clone()));
        }

        validate_no_double_spend(self)?;

        let total_fees = self.collected_fees();
        for tx in &self.transactions {
            if !tx.is_fee() && tx.fee() < fee_per_tx {
                return Err(ChainError::invalid_transaction(ChainError::FeeTooLow {
                    fee: tx.fee(),
                    required: fee_per_tx,
                }));
            }
            tx.is_valid(difficulty, total_fees)
                .map_err(ChainError::invalid_transaction)?;
        }

        Ok(())
    }
}

/// Where a transaction hash was found, if anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionLocation {
    pub mempool_index: Option<usize>,
    pub block_index: Option<u64>,
}

impl TransactionLocation {
    pub fn is_found(&self) -> bool {
        self.mempool_index.is_some() || self.block_index.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
    mempool: Mempool,
    config: ChainConfig,
    /// Mined transaction hash to the index of its block.
    tx_index: HashMap<HashHex, u64>,
    /// Block hash to its index.
    block_index: HashMap<HashHex, u64>,
    state: UtxoState,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new(ChainConfig::default())
    }
}

impl Blockchain {
    pub fn new(config: ChainConfig) -> Self {
        let mut blockchain = Blockchain {
            blocks: Vec::new(),
            mempool: Mempool::with_capacity(config.mempool_capacity),
            config,
            tx_index: HashMap::new(),
            block_index: HashMap::new(),
            state: UtxoState::new(),
        };
        blockchain.append(Self::genesis_block());
        blockchain
    }

    /// Block 0. Never validated against a predecessor.
    pub fn genesis_block() -> Block {
        let marker = Transaction::with_timestamp(
            TransactionType::Fee,
            GENESIS_TIMESTAMP,
            Vec::new(),
            vec![TransactionOutput::new(GENESIS_ADDRESS, 1)],
        );
        let mut genesis = Block {
            index: 0,
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            transactions: vec![marker],
            timestamp: GENESIS_TIMESTAMP,
            miner: GENESIS_ADDRESS.to_string(),
            hash: HashHex::new(),
            nonce: 0,
        };
        genesis.hash = genesis.compute_hash();
        genesis
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Number of blocks, genesis included.
    pub fn height(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn last_block(&self) -> &Block {
        // The genesis block is appended on construction and blocks are never removed.
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn difficulty(&self) -> u32 {
        self.config.difficulty
    }

    pub fn fee_per_tx(&self) -> i64 {
        self.config.fee_per_tx
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Admits a transaction into the mempool.
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<(), ChainError> {
        let result = self.admit(tx);
        if let Err(e) = &result {
            warn!(reason = %e, "transaction rejected");
        }
        result
    }

    fn admit(&mut self, tx: Transaction) -> Result<(), ChainError> {
        tx.is_valid(self.difficulty(), 0)
            .map_err(ChainError::invalid_transaction)?;

        if tx.is_fee() {
            return Err(ChainError::invalid_transaction(
                ChainError::UnexpectedFeeTransaction,
            ));
        }
        if tx.fee() < self.fee_per_tx() {
            return Err(ChainError::invalid_transaction(ChainError::FeeTooLow {
                fee: tx.fee(),
                required: self.fee_per_tx(),
            }));
        }

        if self.mempool.contains(&tx.hash) {
            return Err(ChainError::PendingTransactionExists(tx.hash.clone()));
        }
        for input in &tx.tx_inputs {
            if let Some(pending) = self.mempool.find_spender(&input.previous_tx, &input.from_address) {
                return Err(ChainError::PendingTransactionExists(format!(
                    "{} already spends {} for {}",
                    pending.hash, input.previous_tx, input.from_address
                )));
            }
        }

        if self.tx_index.contains_key(&tx.hash) {
            return Err(ChainError::DuplicateTransaction(tx.hash.clone()));
        }
        for input in &tx.tx_inputs {
            if self.state.is_spent(&input.previous_tx, &input.from_address) {
                return Err(ChainError::DoubleSpendDetected(format!(
                    "{} was already spent by {}",
                    input.previous_tx, input.from_address
                )));
            }
        }

        info!(hash = %tx.hash, fee = tx.fee(), "transaction added to mempool");
        self.mempool.add_transaction(tx)
    }

    /// Template for the next block, or `None` when there is nothing to mine.
    pub fn next_block(&self) -> Option<BlockInfo> {
        if self.mempool.is_empty() {
            return None;
        }
        let last = self.last_block();
        Some(BlockInfo {
            index: self.height(),
            previous_hash: last.hash.clone(),
            difficulty: self.difficulty(),
            fee_per_tx: self.fee_per_tx(),
            transactions: self.mempool.head(self.config.tx_per_block).to_vec(),
        })
    }

    /// Validates `block` as the next block and appends it. The only way the chain grows.
    pub fn add_block(&mut self, block: Block) -> Result<(), ChainError> {
        let last = self.last_block();
        let validation = block
            .is_valid(&last.hash, last.index, self.difficulty(), self.fee_per_tx())
            .and_then(|_| validate_against_history(&block, &self.tx_index, &self.state));

        if let Err(e) = validation {
            warn!(index = block.index, hash = %block.hash, reason = %e, "block rejected");
            return Err(ChainError::invalid_block(e));
        }

        info!(
            index = block.index,
            hash = %block.hash,
            transactions = block.transactions.len(),
            miner = %block.miner,
            "block accepted"
        );
        self.append(block);
        Ok(())
    }

    fn append(&mut self, block: Block) {
        for tx in &block.transactions {
            self.tx_index.insert(tx.hash.clone(), block.index);
            if self.mempool.remove_transaction(&tx.hash).is_some() {
                debug!(hash = %tx.hash, "removed mined transaction from mempool");
            }
        }
        self.state.apply_block(&block);

        // Pending spends of pairs this block consumed can never be mined.
        let state = &self.state;
        let evicted = self.mempool.retain(|tx| {
            !tx.tx_inputs
                .iter()
                .any(|input| state.is_spent(&input.previous_tx, &input.from_address))
        });
        if evicted > 0 {
            warn!(evicted, index = block.index, "evicted conflicting transactions from mempool");
        }

        self.block_index.insert(block.hash.clone(), block.index);
        self.blocks.push(block);
    }

    /// Replays the whole chain from genesis.
    pub fn is_valid(&self) -> Result<(), ChainError> {
        replay_chain(&self.blocks, self.difficulty(), self.fee_per_tx())
    }

    pub fn block_at(&self, index: u64) -> Option<&Block> {
        self.blocks.get(usize::try_from(index).ok()?)
    }

    pub fn block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.block_index
            .get(hash)
            .and_then(|index| self.block_at(*index))
    }

    pub fn transaction_location(&self, hash: &str) -> TransactionLocation {
        TransactionLocation {
            mempool_index: self.mempool.position(hash),
            block_index: self.tx_index.get(hash).copied(),
        }
    }

    /// A transaction from the mempool or from mined history.
    pub fn get_transaction(&self, hash: &str) -> Option<&Transaction> {
        if let Some(tx) = self.mempool.get_transaction(hash) {
            return Some(tx);
        }
        let block = self.block_at(*self.tx_index.get(hash)?)?;
        block.transactions.iter().find(|tx| tx.hash == hash)
    }

    /// Balance and unspent outputs for `address` as of the chain tip.
    pub fn wallet(&self, address: &str) -> WalletSummary {
        WalletSummary {
            balance: self.state.balance(address),
            fee: self.fee_per_tx(),
            utxo: self.state.unspent_outputs(address).to_vec(),
        }
    }
}
