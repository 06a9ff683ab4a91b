//! Wallet: a keypair plus helpers for spending outputs

use crate::crypto::{Address, KeyPair};
use crate::error::ChainError;
use crate::transaction::{Transaction, TransactionInput, TransactionOutput};

const SECRET_HEX_LEN: usize = 64;

/// Holds one keypair for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Wallet {
    keypair: KeyPair,
}

impl Wallet {
    pub fn create() -> Self {
        Wallet {
            keypair: KeyPair::generate(),
        }
    }

    /// Restores a wallet from a hex private key or a WIF string.
    pub fn recover(secret_or_wif: &str) -> Result<Self, ChainError> {
        let secret = secret_or_wif.trim();
        let looks_like_hex =
            secret.len() == SECRET_HEX_LEN && secret.chars().all(|c| c.is_ascii_hexdigit());

        let keypair = if looks_like_hex {
            KeyPair::from_secret_hex(secret)?
        } else {
            KeyPair::from_wif(secret).map_err(|e| {
                ChainError::InvalidKeyFormat(format!(
                    "neither a hex private key nor a valid WIF string ({})",
                    e
                ))
            })?
        };

        Ok(Wallet { keypair })
    }

    /// The compressed public key in hex, used as the wallet's address.
    pub fn address(&self) -> Address {
        self.keypair.public_key_hex()
    }

    pub fn public_key(&self) -> Address {
        self.address()
    }

    pub fn private_key_hex(&self) -> String {
        self.keypair.secret_hex()
    }

    pub fn to_wif(&self) -> String {
        self.keypair.to_wif()
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    pub fn sign_input(&self, input: &mut TransactionInput) {
        input.sign(&self.keypair);
    }

    /// Spends `output` (which must belong to this wallet), paying `amount`
    /// to `to`, leaving `fee` for the miner and returning the rest as change.
    pub fn spend(
        &self,
        output: &TransactionOutput,
        to: &str,
        amount: i64,
        fee: i64,
    ) -> Result<Transaction, ChainError> {
        if output.to_address != self.address() {
            return Err(ChainError::invalid_transaction(ChainError::BadSignature(
                output.to_address.clone(),
            )));
        }
        if output.tx.is_none() {
            return Err(ChainError::invalid_transaction(ChainError::MissingPreviousTx));
        }
        if amount < 1 {
            return Err(ChainError::invalid_transaction(ChainError::NonPositiveAmount(amount)));
        }
        let change = output
            .amount
            .checked_sub(amount)
            .and_then(|rest| rest.checked_sub(fee))
            .filter(|change| fee >= 0 && *change >= 0)
            .ok_or_else(|| {
                ChainError::invalid_transaction(ChainError::InsufficientInputs {
                    inputs: output.amount,
                    outputs: amount.saturating_add(fee),
                })
            })?;

        let mut input = TransactionInput::from_output(output);
        self.sign_input(&mut input);

        let mut outputs = vec![TransactionOutput::new(to, amount)];
        if change > 0 {
            outputs.push(TransactionOutput::new(self.address(), change));
        }

        Ok(Transaction::regular(vec![input], outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_creation() {
        let wallet = Wallet::create();
        assert_eq!(wallet.address().len(), 66);
        assert!(wallet.address().starts_with("02") || wallet.address().starts_with("03"));
        assert_eq!(wallet.private_key_hex().len(), 64);
    }

    #[test]
    fn test_recover_round_trip() {
        let wallet = Wallet::create();
        let recovered = Wallet::recover(&wallet.private_key_hex()).unwrap();
        let again = Wallet::recover(&recovered.private_key_hex()).unwrap();
        assert_eq!(again.public_key(), wallet.public_key());
    }

    #[test]
    fn test_recover_from_wif() {
        let wallet = Wallet::create();
        let recovered = Wallet::recover(&wallet.to_wif()).unwrap();
        assert_eq!(recovered.address(), wallet.address());
    }

    #[test]
    fn test_recover_rejects_garbage() {
        for input in ["", "not a key", "0OIl", "zz11"] {
            assert!(matches!(
                Wallet::recover(input),
                Err(ChainError::InvalidKeyFormat(_))
            ));
        }
    }

    #[test]
    fn test_spend_with_change() {
        let alice = Wallet::create();
        let bob = Wallet::create();
        let funding = Transaction::reward(alice.address(), 10);

        let tx = alice.spend(&funding.tx_outputs[0], &bob.address(), 6, 1).unwrap();
        assert!(tx.is_valid(0, 0).is_ok());
        assert_eq!(tx.fee(), 1);
        assert_eq!(tx.tx_outputs.len(), 2);
        assert_eq!(tx.tx_outputs[1].to_address, alice.address());
        assert_eq!(tx.tx_outputs[1].amount, 3);
        assert!(tx.spends(&funding.hash, &alice.address()));
    }

    #[test]
    fn test_spend_rejects_foreign_output() {
        let alice = Wallet::create();
        let bob = Wallet::create();
        let funding = Transaction::reward(bob.address(), 10);
        assert!(alice.spend(&funding.tx_outputs[0], &bob.address(), 5, 0).is_err());
    }

    #[test]
    fn test_spend_rejects_overdraft() {
        let alice = Wallet::create();
        let funding = Transaction::reward(alice.address(), 10);
        assert!(alice.spend(&funding.tx_outputs[0], "bob", 10, 1).is_err());
    }

    #[test]
    fn test_spend_rejects_out_of_range_fee() {
        let alice = Wallet::create();
        let funding = Transaction::reward(alice.address(), 10);
        let output = &funding.tx_outputs[0];

        for fee in [i64::MIN, -1, i64::MAX] {
            let err = alice.spend(output, "bob", 5, fee).unwrap_err();
            assert!(matches!(
                err.root_cause(),
                ChainError::InsufficientInputs { inputs: 10, .. }
            ));
        }
        assert!(alice.spend(output, "bob", i64::MAX, 0).is_err());
    }
}
