use crate::crypto::{Address, HashHex};
use crate::transaction::{Transaction, TransactionOutput};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::chain::Block;

/// Unspent outputs per address, derived by replaying accepted blocks.
#[derive(Debug, Clone, Default)]
pub struct UtxoState {
    unspent: HashMap<Address, Vec<TransactionOutput>>,
    /// `(previous_tx, from_address)` pairs consumed by some mined input.
    spent: HashSet<(HashHex, Address)>,
}

/// What `GET /wallets/{address}` reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSummary {
    pub balance: i64,
    /// Minimum fee the node currently requires per transaction.
    pub fee: i64,
    pub utxo: Vec<TransactionOutput>,
}

impl UtxoState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_block(&mut self, block: &Block) {
        for tx in &block.transactions {
            self.apply_transaction(tx);
        }
    }

    pub fn apply_transaction(&mut self, tx: &Transaction) {
        for input in &tx.tx_inputs {
            self.spent
                .insert((input.previous_tx.clone(), input.from_address.clone()));
            if let Some(outputs) = self.unspent.get_mut(&input.from_address) {
                outputs.retain(|o| o.tx.as_deref() != Some(input.previous_tx.as_str()));
                if outputs.is_empty() {
                    self.unspent.remove(&input.from_address);
                }
            }
        }

        for output in &tx.tx_outputs {
            self.unspent
                .entry(output.to_address.clone())
                .or_default()
                .push(output.clone());
        }
    }

    pub fn is_spent(&self, previous_tx: &str, address: &str) -> bool {
        self.spent
            .contains(&(previous_tx.to_string(), address.to_string()))
    }

    pub fn unspent_outputs(&self, address: &str) -> &[TransactionOutput] {
        self.unspent.get(address).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn balance(&self, address: &str) -> i64 {
        self.unspent_outputs(address)
            .iter()
            .fold(0i64, |acc, o| acc.saturating_add(o.amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::transaction::TransactionInput;

    #[test]
    fn test_reward_then_spend() {
        let alice = KeyPair::generate();
        let mut state = UtxoState::new();

        let reward = Transaction::reward(alice.public_key_hex(), 50);
        state.apply_transaction(&reward);
        assert_eq!(state.balance(&alice.public_key_hex()), 50);

        let mut input = TransactionInput::from_output(&reward.tx_outputs[0]);
        input.sign(&alice);
        let payment = Transaction::regular(
            vec![input],
            vec![
                TransactionOutput::new("bob", 30),
                TransactionOutput::new(alice.public_key_hex(), 20),
            ],
        );
        state.apply_transaction(&payment);

        assert!(state.is_spent(&reward.hash, &alice.public_key_hex()));
        assert!(!state.is_spent(&payment.hash, &alice.public_key_hex()));
        assert_eq!(state.balance(&alice.public_key_hex()), 20);
        assert_eq!(state.balance("bob"), 30);
        assert_eq!(state.unspent_outputs("bob")[0].tx.as_deref(), Some(payment.hash.as_str()));
    }

    #[test]
    fn test_unknown_address_is_empty() {
        let state = UtxoState::new();
        assert_eq!(state.balance("nobody"), 0);
        assert!(state.unspent_outputs("nobody").is_empty());
    }
}
