use crate::crypto::HashHex;
use crate::error::ChainError;
use std::collections::{HashMap, HashSet};

use super::chain::Block;
use super::state::UtxoState;

/// No transaction may appear twice in the block, and no two inputs may
/// spend the same `(previous_tx, from_address)`.
pub fn validate_no_double_spend(block: &Block) -> Result<(), ChainError> {
    let mut hashes = HashSet::new();
    for tx in &block.transactions {
        if !hashes.insert(tx.hash.as_str()) {
            return Err(ChainError::DuplicateTransaction(format!(
                "{} appears twice in block {}",
                tx.hash, block.index
            )));
        }
    }

    let mut seen = HashSet::new();
    for input in block.transactions.iter().flat_map(|tx| &tx.tx_inputs) {
        if !seen.insert((input.previous_tx.as_str(), input.from_address.as_str())) {
            return Err(ChainError::DoubleSpendDetected(format!(
                "{} is spent twice by {} within block {}",
                input.previous_tx, input.from_address, block.index
            )));
        }
    }
    Ok(())
}

/// Checks `block` against what is already mined: no transaction may
/// reappear and no input may spend an already consumed output.
pub fn validate_against_history(
    block: &Block,
    tx_index: &HashMap<HashHex, u64>,
    state: &UtxoState,
) -> Result<(), ChainError> {
    for tx in &block.transactions {
        if let Some(index) = tx_index.get(&tx.hash) {
            return Err(ChainError::DuplicateTransaction(format!(
                "{} (mined in block {})",
                tx.hash, index
            )));
        }
        for input in &tx.tx_inputs {
            if state.is_spent(&input.previous_tx, &input.from_address) {
                return Err(ChainError::DoubleSpendDetected(format!(
                    "{} was already spent by {}",
                    input.previous_tx, input.from_address
                )));
            }
        }
    }
    Ok(())
}

/// Re-validates every block after genesis against its predecessor and the
/// history before it.
pub fn replay_chain(blocks: &[Block], difficulty: u32, fee_per_tx: i64) -> Result<(), ChainError> {
    let mut tx_index = HashMap::new();
    let mut state = UtxoState::new();

    for (position, block) in blocks.iter().enumerate() {
        if position > 0 {
            let previous = &blocks[position - 1];
            block
                .is_valid(&previous.hash, previous.index, difficulty, fee_per_tx)
                .and_then(|_| validate_against_history(block, &tx_index, &state))
                .map_err(|e| ChainError::InvalidChain {
                    index: block.index,
                    source: Box::new(e),
                })?;
        }

        for tx in &block.transactions {
            tx_index.insert(tx.hash.clone(), block.index);
        }
        state.apply_block(block);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Blockchain;
    use crate::config::ChainConfig;
    use crate::crypto::KeyPair;
    use crate::transaction::{Transaction, TransactionInput, TransactionOutput};
    use std::sync::atomic::AtomicBool;

    fn signed_spend(from: &KeyPair, previous_tx: &str, to: &str) -> Transaction {
        let mut input = TransactionInput::new(from.public_key_hex(), 5, previous_tx);
        input.sign(from);
        Transaction::regular(vec![input], vec![TransactionOutput::new(to, 5)])
    }

    #[test]
    fn test_double_spend_within_block() {
        let alice = KeyPair::generate();
        let previous = "cc".repeat(32);
        let block = Block::new(
            1,
            "00".repeat(32),
            vec![
                Transaction::reward("miner", 1),
                signed_spend(&alice, &previous, "bob"),
                signed_spend(&alice, &previous, "carol"),
            ],
            "miner".into(),
        );
        assert!(matches!(
            validate_no_double_spend(&block),
            Err(ChainError::DoubleSpendDetected(_))
        ));
    }

    #[test]
    fn test_repeated_transaction_within_block() {
        let alice = KeyPair::generate();
        let spend = signed_spend(&alice, &"cc".repeat(32), "bob");
        let block = Block::new(
            1,
            "00".repeat(32),
            vec![Transaction::reward("miner", 1), spend.clone(), spend],
            "miner".into(),
        );
        assert!(matches!(
            validate_no_double_spend(&block),
            Err(ChainError::DuplicateTransaction(_))
        ));
    }

    #[test]
    fn test_block_with_double_spend_rejected_by_chain() {
        let config = ChainConfig {
            difficulty: 2,
            ..ChainConfig::default()
        };
        let mut chain = Blockchain::new(config);
        let alice = KeyPair::generate();
        let previous = "cc".repeat(32);
        let last = chain.last_block().clone();

        let mut block = Block::new(
            1,
            last.hash,
            vec![
                Transaction::reward("miner", 1),
                signed_spend(&alice, &previous, "bob"),
                signed_spend(&alice, &previous, "carol"),
            ],
            "miner".into(),
        );
        assert!(block.mine(2, "miner", &AtomicBool::new(false)));

        let err = chain.add_block(block).unwrap_err();
        assert!(matches!(err.root_cause(), ChainError::DoubleSpendDetected(_)));
    }

    #[test]
    fn test_replay_reports_failing_index() {
        let config = ChainConfig {
            difficulty: 2,
            ..ChainConfig::default()
        };
        let mut chain = Blockchain::new(config.clone());
        for amount in 1..=2 {
            let last = chain.last_block().clone();
            let mut block = Block::new(
                last.index + 1,
                last.hash,
                vec![Transaction::reward("miner", amount)],
                "miner".into(),
            );
            assert!(block.mine(2, "miner", &AtomicBool::new(false)));
            chain.add_block(block).unwrap();
        }
        assert!(chain.is_valid().is_ok());

        let mut blocks = chain.blocks().to_vec();
        blocks[2].nonce += 1;
        let err = replay_chain(&blocks, config.difficulty, config.fee_per_tx).unwrap_err();
        assert!(matches!(err, ChainError::InvalidChain { index: 2, .. }));
        assert!(matches!(err.root_cause(), ChainError::HashMismatch { .. }));
    }

    #[test]
    fn test_replay_rejects_reused_transaction() {
        let config = ChainConfig {
            difficulty: 2,
            ..ChainConfig::default()
        };
        let chain = Blockchain::new(config.clone());
        let genesis = chain.last_block().clone();
        let reward = Transaction::reward("miner", 1);

        let mut first = Block::new(1, genesis.hash.clone(), vec![reward.clone()], "miner".into());
        assert!(first.mine(2, "miner", &AtomicBool::new(false)));
        let mut second = Block::new(2, first.hash.clone(), vec![reward], "miner".into());
        assert!(second.mine(2, "miner", &AtomicBool::new(false)));

        let err = replay_chain(&[genesis, first, second], 2, 0).unwrap_err();
        assert!(matches!(err, ChainError::InvalidChain { index: 2, .. }));
        assert!(matches!(err.root_cause(), ChainError::DuplicateTransaction(_)));
    }
}
