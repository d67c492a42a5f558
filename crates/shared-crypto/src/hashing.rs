//! # Keccak-256 Hashing
//!
//! Ethereum-compatible digests used by publisher signatures.

use sha3::{Digest, Keccak256};

/// Keccak-256 output (256-bit).
pub type Hash = [u8; 32];

/// Prefix applied by `personal_sign` before hashing.
const ETH_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Keccak-256 hash function.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Digest of `message` as signed by Ethereum `personal_sign`:
/// `keccak256("\x19Ethereum Signed Message:\n" || len(message) || message)`.
pub fn eth_message_hash(message: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(ETH_MESSAGE_PREFIX.as_bytes());
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}
