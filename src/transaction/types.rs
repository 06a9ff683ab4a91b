/// Transaction types for powledger
use crate::crypto::{sha256, sha256_hex, Address, HashHex, KeyPair};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Last timestamp handed to a reward transaction built in this process.
static LAST_REWARD_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Moves value from inputs to outputs.
    Regular,
    /// Miner reward. Carries no inputs.
    Fee,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Regular => "regular",
            TransactionType::Fee => "fee",
        }
    }
}

/// New spendable value credited to `to_address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOutput {
    pub to_address: Address,
    pub amount: i64,
    /// Hash of the owning transaction, filled in once that hash is known.
    #[serde(default)]
    pub tx: Option<HashHex>,
}

impl TransactionOutput {
    pub fn new(to_address: impl Into<Address>, amount: i64) -> Self {
        TransactionOutput {
            to_address: to_address.into(),
            amount,
            tx: None,
        }
    }

    /// `sha256(toAddress + amount + tx)`
    pub fn hash(&self) -> HashHex {
        sha256_hex(&[
            self.to_address.as_bytes(),
            self.amount.to_string().as_bytes(),
            self.tx.as_deref().unwrap_or_default().as_bytes(),
        ])
    }

    /// The hash as it was before the owning transaction was known.
    /// Transaction hashes commit to this form, which keeps them stable once
    /// the back-reference is filled in.
    pub fn unbound_hash(&self) -> HashHex {
        sha256_hex(&[
            self.to_address.as_bytes(),
            self.amount.to_string().as_bytes(),
        ])
    }
}

/// Spends an earlier output. `from_address` is the spender's public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInput {
    pub from_address: Address,
    pub amount: i64,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub previous_tx: HashHex,
}

impl TransactionInput {
    pub fn new(from_address: impl Into<Address>, amount: i64, previous_tx: impl Into<HashHex>) -> Self {
        TransactionInput {
            from_address: from_address.into(),
            amount,
            signature: None,
            previous_tx: previous_tx.into(),
        }
    }

    /// Builds an unsigned input consuming `output`.
    pub fn from_output(output: &TransactionOutput) -> Self {
        TransactionInput {
            from_address: output.to_address.clone(),
            amount: output.amount,
            signature: None,
            previous_tx: output.tx.clone().unwrap_or_default(),
        }
    }

    pub fn digest(&self) -> [u8; 32] {
        sha256(&[
            self.from_address.as_bytes(),
            self.amount.to_string().as_bytes(),
        ])
    }

    /// `sha256(fromAddress + amount)`, the message that gets signed.
    pub fn hash(&self) -> HashHex {
        hex::encode(self.digest())
    }

    /// Signs the input hash. Repeated calls yield the same signature.
    pub fn sign(&mut self, keypair: &KeyPair) {
        self.signature = Some(hex::encode(keypair.sign_digest(&self.digest())));
    }
}

/// A transaction that can occur in a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub timestamp: u64,
    pub hash: HashHex,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tx_inputs: Vec<TransactionInput>,
    pub tx_outputs: Vec<TransactionOutput>,
}

impl Transaction {
    /// Builds a transaction stamped with the current time and binds its outputs.
    pub fn new(
        tx_type: TransactionType,
        tx_inputs: Vec<TransactionInput>,
        tx_outputs: Vec<TransactionOutput>,
    ) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis() as u64;
        Self::with_timestamp(tx_type, timestamp, tx_inputs, tx_outputs)
    }

    pub fn with_timestamp(
        tx_type: TransactionType,
        timestamp: u64,
        tx_inputs: Vec<TransactionInput>,
        tx_outputs: Vec<TransactionOutput>,
    ) -> Self {
        let mut tx = Transaction {
            tx_type,
            timestamp,
            hash: HashHex::new(),
            tx_inputs,
            tx_outputs,
        };
        tx.finalize();
        tx
    }

    pub fn regular(tx_inputs: Vec<TransactionInput>, tx_outputs: Vec<TransactionOutput>) -> Self {
        Self::new(TransactionType::Regular, tx_inputs, tx_outputs)
    }

    /// Reward transaction crediting `miner` with `amount`.
    ///
    /// Reward timestamps are strictly increasing within a process, so two
    /// rewards for the same miner and amount never share a hash even when
    /// built in the same millisecond.
    pub fn reward(miner: impl Into<Address>, amount: i64) -> Self {
        Self::with_timestamp(
            TransactionType::Fee,
            next_reward_timestamp(),
            Vec::new(),
            vec![TransactionOutput::new(miner, amount)],
        )
    }

    /// Recomputes the hash and points every output back at it.
    pub fn finalize(&mut self) {
        self.hash = self.compute_hash();
        for output in &mut self.tx_outputs {
            output.tx = Some(self.hash.clone());
        }
    }

    /// `sha256(type + timestamp + join(outputHashes) + join(inputSignatures))`
    pub fn compute_hash(&self) -> HashHex {
        let output_hashes: String = self.tx_outputs.iter().map(|o| o.unbound_hash()).collect();
        let signatures: String = self
            .tx_inputs
            .iter()
            .map(|i| i.signature.as_deref().unwrap_or_default())
            .collect();

        sha256_hex(&[
            self.tx_type.as_str().as_bytes(),
            self.timestamp.to_string().as_bytes(),
            output_hashes.as_bytes(),
            signatures.as_bytes(),
        ])
    }

    pub fn is_fee(&self) -> bool {
        self.tx_type == TransactionType::Fee
    }

    pub fn input_total(&self) -> i64 {
        self.tx_inputs
            .iter()
            .fold(0i64, |acc, input| acc.saturating_add(input.amount))
    }

    pub fn output_total(&self) -> i64 {
        self.tx_outputs
            .iter()
            .fold(0i64, |acc, output| acc.saturating_add(output.amount))
    }

    /// Inputs minus outputs; zero for transactions without inputs.
    pub fn fee(&self) -> i64 {
        if self.tx_inputs.is_empty() {
            0
        } else {
            self.input_total().saturating_sub(self.output_total())
        }
    }

    /// Whether this transaction spends `previous_tx` on behalf of `address`.
    pub fn spends(&self, previous_tx: &str, address: &str) -> bool {
        self.tx_inputs
            .iter()
            .any(|i| i.previous_tx == previous_tx && i.from_address == address)
    }
}

fn next_reward_timestamp() -> u64 {
    let now = chrono::Utc::now().timestamp_millis() as u64;
    let bump = |last: u64| now.max(last + 1);
    match LAST_REWARD_TIMESTAMP.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
        Some(bump(last))
    }) {
        Ok(last) | Err(last) => bump(last),
    }
}
