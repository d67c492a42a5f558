//! # ECDSA Signatures (secp256k1)
//!
//! Ethereum-style `personal_sign` signatures used to authenticate
//! publishers.
//!
//! ## Security Properties
//!
//! - RFC 6979 deterministic nonces (no RNG dependency for signing)
//! - Low-S normalization (EIP-2)
//! - Signer identity is the recovered 20-byte address, never a claimed key
//!
//! ## Wire Layout
//!
//! ```text
//! [r: 32][s: 32][v: 1]   v ∈ {27, 28} (0 and 1 accepted on input)
//! ```

use crate::hashing::{eth_message_hash, keccak256};
use crate::CryptoError;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use zeroize::Zeroize;

/// Length of a recoverable signature in bytes.
pub const ETH_SIGNATURE_LEN: usize = 65;

/// secp256k1 ECDSA keypair identified by its Ethereum address.
pub struct Secp256k1KeyPair {
    signing_key: SigningKey,
}

impl Secp256k1KeyPair {
    /// Generate random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Create from secret key bytes (32 bytes).
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_bytes((&bytes).into()).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Ethereum address of this keypair.
    pub fn address(&self) -> [u8; 20] {
        address_from_pubkey(self.signing_key.verifying_key())
    }

    /// Sign `message` the way Ethereum `personal_sign` does.
    ///
    /// Returns `r || s || v` with `v ∈ {27, 28}`.
    pub fn sign_eth_message(&self, message: &[u8]) -> Result<[u8; ETH_SIGNATURE_LEN], CryptoError> {
        let digest = eth_message_hash(message);
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

        let mut out = [0u8; ETH_SIGNATURE_LEN];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = recovery_id.to_byte() + 27;
        Ok(out)
    }
}

impl Drop for Secp256k1KeyPair {
    fn drop(&mut self) {
        // Zeroize secret key material
        let mut bytes: [u8; 32] = self.signing_key.to_bytes().into();
        bytes.zeroize();
    }
}

/// Recover the Ethereum address that produced `signature` over `message`.
///
/// # Errors
///
/// - `CryptoError::InvalidSignatureLength` unless 65 bytes are supplied
/// - `CryptoError::InvalidRecoveryId` for a `v` outside {0, 1, 27, 28}
/// - `CryptoError::InvalidSignatureFormat` / `RecoveryFailed` on bad curve data
pub fn recover_eth_address(message: &[u8], signature: &[u8]) -> Result<[u8; 20], CryptoError> {
    if signature.len() != ETH_SIGNATURE_LEN {
        return Err(CryptoError::InvalidSignatureLength {
            expected: ETH_SIGNATURE_LEN,
            actual: signature.len(),
        });
    }

    let recovery_id = parse_recovery_id(signature[64])?;
    let sig = Signature::from_slice(&signature[..64])
        .map_err(|_| CryptoError::InvalidSignatureFormat)?;

    let digest = eth_message_hash(message);
    let recovered = VerifyingKey::recover_from_prehash(&digest, &sig, recovery_id)
        .map_err(|_| CryptoError::RecoveryFailed)?;

    Ok(address_from_pubkey(&recovered))
}

/// Derive Ethereum address from public key.
fn address_from_pubkey(public_key: &VerifyingKey) -> [u8; 20] {
    let pubkey_bytes = public_key.to_encoded_point(false);

    // Keccak256 hash of public key (without 0x04 prefix)
    let hash = keccak256(&pubkey_bytes.as_bytes()[1..]);

    // Take last 20 bytes as address
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

fn parse_recovery_id(v: u8) -> Result<RecoveryId, CryptoError> {
    let normalized = match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        other => return Err(CryptoError::InvalidRecoveryId(other)),
    };
    RecoveryId::from_byte(normalized).ok_or(CryptoError::InvalidRecoveryId(v))
}
