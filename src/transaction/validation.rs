/// Validation logic for transactions separated from type definitions
use crate::crypto::verify_signature;
use crate::economics::reward_for_difficulty;
use crate::error::ChainError;
use crate::transaction::types::{Transaction, TransactionInput, TransactionOutput};

impl TransactionOutput {
    pub fn is_valid(&self) -> Result<(), ChainError> {
        if self.amount < 1 {
            return Err(ChainError::NonPositiveAmount(self.amount));
        }
        Ok(())
    }
}

impl TransactionInput {
    /// Stateless checks: signature present, positive amount, reference set,
    /// and the signature verifies against `from_address`.
    pub fn is_valid(&self) -> Result<(), ChainError> {
        let signature = self.signature.as_deref().ok_or(ChainError::MissingSignature)?;

        if self.amount < 1 {
            return Err(ChainError::NonPositiveAmount(self.amount));
        }
        if self.previous_tx.is_empty() {
            return Err(ChainError::MissingPreviousTx);
        }

        verify_signature(&self.from_address, &self.digest(), signature)
            .map_err(|_| ChainError::BadSignature(self.from_address.clone()))
    }
}

impl Transaction {
    /// Validates the transaction in isolation. `total_fees` is what the
    /// surrounding block collects and only matters for fee transactions.
    pub fn is_valid(&self, difficulty: u32, total_fees: i64) -> Result<(), ChainError> {
        let expected = self.compute_hash();
        if expected != self.hash {
            return Err(ChainError::HashMismatch {
                expected,
                actual: self.hash.clone(),
            });
        }

        if self.tx_outputs.is_empty() {
            return Err(ChainError::InvalidOutputs(
                "transaction has no outputs".to_string(),
            ));
        }
        for (i, output) in self.tx_outputs.iter().enumerate() {
            output
                .is_valid()
                .map_err(|e| ChainError::InvalidOutputs(format!("output {}: {}", i, e)))?;
        }

        if !self.tx_inputs.is_empty() {
            if self.is_fee() {
                return Err(ChainError::InvalidInputs(
                    "fee transactions cannot spend inputs".to_string(),
                ));
            }

            let failures: Vec<String> = self
                .tx_inputs
                .iter()
                .enumerate()
                .filter_map(|(i, input)| input.is_valid().err().map(|e| format!("input {}: {}", i, e)))
                .collect();
            if !failures.is_empty() {
                return Err(ChainError::InvalidInputs(failures.join("; ")));
            }

            let (inputs, outputs) = (self.input_total(), self.output_total());
            if inputs < outputs {
                return Err(ChainError::InsufficientInputs { inputs, outputs });
            }
        }

        if self
            .tx_outputs
            .iter()
            .any(|o| o.tx.as_deref() != Some(self.hash.as_str()))
        {
            return Err(ChainError::OutputTxMismatch(self.hash.clone()));
        }

        if self.is_fee() {
            let max = reward_for_difficulty(difficulty).saturating_add(total_fees);
            let amount = self.output_total();
            if amount > max {
                return Err(ChainError::ExcessiveReward { amount, max });
            }
        }

        Ok(())
    }
}
