//! Cryptographic primitives for the TrinityChain light client

use crate::error::ClientError;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, SECRET_KEY_SIZE},
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha2::{Digest, Sha256};

/// A thread-safe, lazily initialized Secp256k1 context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

pub type Sha256Hash = [u8; 32];

/// Raw public key as carried in transactions: the X and Y coordinates, 32 bytes each.
pub type PublicKeyBytes = [u8; 64];

/// Compact signature produced by an external signer.
pub type SignatureBytes = [u8; COMPACT_SIGNATURE_SIZE];

/// SHA-256 of arbitrary bytes. Transaction hashing and Merkle recombination
/// both go through this function.
pub fn hash_bytes(data: &[u8]) -> Sha256Hash {
    Sha256::digest(data).into()
}

/// SHA-256 of `left || right`.
pub fn hash_concat(left: &Sha256Hash, right: &Sha256Hash) -> Sha256Hash {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Hex of the first 8 bytes of a hash, used in log lines and user messages.
pub fn short_hex(hash: &Sha256Hash) -> String {
    hex::encode(&hash[..8])
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Self {
        Self::from_secret_key(SecretKey::new(&mut OsRng))
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    /// Creates a KeyPair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ClientError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| {
            if bytes.len() != SECRET_KEY_SIZE {
                ClientError::CryptoError(format!(
                    "Secret key must be {} bytes, got {}",
                    SECRET_KEY_SIZE,
                    bytes.len()
                ))
            } else {
                ClientError::CryptoError(format!("Invalid secret key bytes: {}", e))
            }
        })?;

        Ok(Self::from_secret_key(secret_key))
    }

    /// Uncompressed public key without the leading 0x04 tag.
    pub fn public_key_xy(&self) -> PublicKeyBytes {
        let uncompressed = self.public_key.serialize_uncompressed();
        let mut xy = [0u8; 64];
        xy.copy_from_slice(&uncompressed[1..]);
        xy
    }

    pub fn secret_bytes(&self) -> [u8; SECRET_KEY_SIZE] {
        self.secret_key.secret_bytes()
    }

    /// Signs a transaction hash as-is (it is already a digest) and returns the compact signature.
    pub fn sign_digest(&self, digest: &Sha256Hash) -> SignatureBytes {
        let message = Message::from_digest(*digest);
        SECP256K1_CONTEXT
            .sign_ecdsa(&message, &self.secret_key)
            .serialize_compact()
    }
}
