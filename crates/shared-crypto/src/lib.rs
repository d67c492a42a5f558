//! # Shared Crypto - Stream Delivery Primitives
//!
//! Concrete implementations of the two cryptographic operations the
//! subscription engine treats as opaque.
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `symmetric` | AES-256-GCM | Group-key content encryption |
//! | `hashing` | Keccak-256 | Ethereum message digests |
//! | `ecdsa` | secp256k1 | Publisher signing and signer recovery |
//!
//! ## Security Properties
//!
//! - **AES-256-GCM**: 96-bit random nonce per message, authenticated
//! - **secp256k1**: RFC 6979 deterministic, low-S normalization (EIP-2)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ecdsa;
pub mod errors;
pub mod hashing;
pub mod symmetric;

// Re-exports
pub use ecdsa::{recover_eth_address, Secp256k1KeyPair, ETH_SIGNATURE_LEN};
pub use errors::CryptoError;
pub use hashing::{eth_message_hash, keccak256};
pub use symmetric::{decrypt, encrypt, SecretKey, NONCE_LEN};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
