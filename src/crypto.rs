//! Cryptographic primitives for powledger

use crate::error::ChainError;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha2::{Digest, Sha256};

/// A thread-safe, lazily initialized Secp256k1 context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Hex-encoded SHA-256 digest, the identity of blocks and transactions.
pub type HashHex = String;

/// Hex-encoded compressed public key. Addresses are public keys, so a
/// signature can be checked against the address that owns an output.
pub type Address = String;

const WIF_MAINNET_PREFIX: u8 = 0x80;
const WIF_TESTNET_PREFIX: u8 = 0xEF;
const WIF_COMPRESSED_FLAG: u8 = 0x01;

/// SHA-256 over the concatenation of `parts`.
pub fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Like [`sha256`] but returns the digest hex encoded.
pub fn sha256_hex(parts: &[&[u8]]) -> HashHex {
    hex::encode(sha256(parts))
}

fn checksum(payload: &[u8]) -> [u8; 4] {
    let once = Sha256::digest(payload);
    let twice = Sha256::digest(once);
    let mut out = [0u8; 4];
    out.copy_from_slice(&twice[..4]);
    out
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Self {
        let secret_key = SecretKey::new(&mut OsRng);
        Self::from_secret_key(secret_key)
    }

    /// Creates a KeyPair from an existing SecretKey.
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    /// Creates a KeyPair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        if bytes.len() != SECRET_KEY_SIZE {
            return Err(ChainError::InvalidKeyFormat(format!(
                "Secret key must be {} bytes, got {}",
                SECRET_KEY_SIZE,
                bytes.len()
            )));
        }
        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|e| ChainError::InvalidKeyFormat(format!("Invalid secret key bytes: {}", e)))?;

        Ok(Self::from_secret_key(secret_key))
    }

    /// Parses a 64 character hex private key.
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, ChainError> {
        let bytes = hex::decode(secret_hex.trim())
            .map_err(|e| ChainError::InvalidKeyFormat(format!("Invalid hex secret: {}", e)))?;
        Self::from_secret_bytes(&bytes)
    }

    /// Decodes a Wallet-Import-Format string, verifying its checksum.
    pub fn from_wif(wif: &str) -> Result<Self, ChainError> {
        let bytes = bs58::decode(wif.trim())
            .into_vec()
            .map_err(|e| ChainError::InvalidKeyFormat(format!("Invalid base58: {}", e)))?;

        // version + key [+ compression flag] + checksum
        if bytes.len() != 1 + SECRET_KEY_SIZE + 4 && bytes.len() != 1 + SECRET_KEY_SIZE + 1 + 4 {
            return Err(ChainError::InvalidKeyFormat(format!(
                "Invalid WIF length {}",
                bytes.len()
            )));
        }

        let (payload, sum) = bytes.split_at(bytes.len() - 4);
        if checksum(payload) != sum {
            return Err(ChainError::InvalidKeyFormat("WIF checksum mismatch".to_string()));
        }
        if payload[0] != WIF_MAINNET_PREFIX && payload[0] != WIF_TESTNET_PREFIX {
            return Err(ChainError::InvalidKeyFormat(format!(
                "Unknown WIF version byte {:#04x}",
                payload[0]
            )));
        }
        if payload.len() == 1 + SECRET_KEY_SIZE + 1 && payload[SECRET_KEY_SIZE + 1] != WIF_COMPRESSED_FLAG {
            return Err(ChainError::InvalidKeyFormat(
                "Invalid WIF compression flag".to_string(),
            ));
        }

        Self::from_secret_bytes(&payload[1..=SECRET_KEY_SIZE])
    }

    /// Encodes the secret key as a compressed mainnet WIF string.
    pub fn to_wif(&self) -> String {
        let mut payload = Vec::with_capacity(1 + SECRET_KEY_SIZE + 1 + 4);
        payload.push(WIF_MAINNET_PREFIX);
        payload.extend_from_slice(&self.secret_key.secret_bytes());
        payload.push(WIF_COMPRESSED_FLAG);
        let sum = checksum(&payload);
        payload.extend_from_slice(&sum);
        bs58::encode(payload).into_string()
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// The compressed public key, hex encoded. This is the address.
    pub fn public_key_hex(&self) -> Address {
        hex::encode(self.public_key_bytes())
    }

    /// Returns the KeyPair's public key as a compressed byte array.
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public_key.serialize()
    }

    /// Signs a 32-byte digest and returns the compact signature bytes.
    /// Nonces are derived per RFC6979, so equal inputs give equal signatures.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> [u8; COMPACT_SIGNATURE_SIZE] {
        let message = Message::from_digest(*digest);
        SECP256K1_CONTEXT
            .sign_ecdsa(&message, &self.secret_key)
            .serialize_compact()
    }
}

/// Verifies a hex compact signature over `digest` for a hex public key.
pub fn verify_signature(
    public_key_hex: &str,
    digest: &[u8; 32],
    signature_hex: &str,
) -> Result<(), ChainError> {
    let public_key_bytes = hex::decode(public_key_hex)
        .map_err(|e| ChainError::CryptoError(format!("Invalid public key hex: {}", e)))?;
    if public_key_bytes.len() != PUBLIC_KEY_SIZE {
        return Err(ChainError::CryptoError(format!(
            "Public key must be exactly {} bytes (compressed), got {}",
            PUBLIC_KEY_SIZE,
            public_key_bytes.len()
        )));
    }
    let signature_bytes = hex::decode(signature_hex)
        .map_err(|e| ChainError::CryptoError(format!("Invalid signature hex: {}", e)))?;
    if signature_bytes.len() != COMPACT_SIGNATURE_SIZE {
        return Err(ChainError::CryptoError(format!(
            "Signature must be exactly {} bytes (compact), got {}",
            COMPACT_SIGNATURE_SIZE,
            signature_bytes.len()
        )));
    }

    let public_key = PublicKey::from_slice(&public_key_bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid public key: {}", e)))?;
    let signature = Signature::from_compact(&signature_bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid signature: {}", e)))?;
    let message = Message::from_digest(*digest);

    SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| ChainError::CryptoError("Signature verification failed".to_string()))
}
