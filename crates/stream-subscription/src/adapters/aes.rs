//! # AES-GCM Content Cipher
//!
//! Encrypted content travels as hex of `nonce(12) ‖ ciphertext ‖ tag`.
//! Rotated keys embedded in messages use the same layout over the 32 raw
//! key bytes.

use shared_crypto::{decrypt, encrypt, CryptoError, SecretKey};
use shared_types::{EncryptedGroupKey, GroupKey, StreamMessage};

use crate::domain::SubscriptionError;
use crate::ports::MessageDecryptor;

/// AES-256-GCM implementation of the decrypt primitive.
#[derive(Debug, Default, Clone, Copy)]
pub struct AesGcmDecryptor;

impl MessageDecryptor for AesGcmDecryptor {
    fn decrypt(&self, msg: &mut StreamMessage, key: &GroupKey) -> Result<(), SubscriptionError> {
        let plaintext = decrypt_content(msg.serialized_content(), key)?;
        msg.replace_with_plaintext(plaintext);
        Ok(())
    }
}

/// Encrypts `plaintext` under `key` into transmittable hex.
pub fn encrypt_content(plaintext: &str, key: &GroupKey) -> Result<String, SubscriptionError> {
    Ok(hex::encode(seal(plaintext.as_bytes(), key)?))
}

/// Inverse of [`encrypt_content`].
pub fn decrypt_content(content_hex: &str, key: &GroupKey) -> Result<String, SubscriptionError> {
    let plaintext = open(content_hex, key)?;
    String::from_utf8(plaintext)
        .map_err(|_| CryptoError::DecryptionFailed("plaintext is not UTF-8".to_string()).into())
}

/// Encrypts `new_key` under `current` for embedding in a message.
pub fn encrypt_group_key(
    new_key: &GroupKey,
    current: &GroupKey,
) -> Result<EncryptedGroupKey, SubscriptionError> {
    let sealed = seal(new_key.key_bytes(), current)?;
    Ok(EncryptedGroupKey::new(new_key.group_key_id(), hex::encode(sealed)))
}

/// Recovers a rotated key encrypted under `current`.
pub fn decrypt_group_key(
    encrypted: &EncryptedGroupKey,
    current: &GroupKey,
) -> Result<GroupKey, SubscriptionError> {
    let raw = open(&encrypted.encrypted_group_key_hex, current)?;
    let key: [u8; 32] = raw.as_slice().try_into().map_err(|_| {
        CryptoError::DecryptionFailed(format!("group key has {} bytes, expected 32", raw.len()))
    })?;
    Ok(GroupKey::new(encrypted.group_key_id.clone(), key))
}

fn seal(plaintext: &[u8], key: &GroupKey) -> Result<Vec<u8>, SubscriptionError> {
    Ok(encrypt(&SecretKey::from_bytes(*key.key_bytes()), plaintext)?)
}

fn open(content_hex: &str, key: &GroupKey) -> Result<Vec<u8>, SubscriptionError> {
    let sealed = hex::decode(content_hex.trim_start_matches("0x"))
        .map_err(|e| CryptoError::DecryptionFailed(format!("content is not hex: {e}")))?;
    Ok(decrypt(&SecretKey::from_bytes(*key.key_bytes()), &sealed)?)
}
