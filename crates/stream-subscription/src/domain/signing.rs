//! # Message Signatures
//!
//! Ethereum `personal_sign` signatures over a canonical payload:
//!
//! ```text
//! streamId ‖ partition ‖ timestamp ‖ sequenceNumber ‖ publisherId ‖ msgChainId
//!   ‖ [prevTimestamp ‖ prevSequenceNumber] ‖ content ‖ [newGroupKeyId ‖ newGroupKeyHex]
//! ```
//!
//! Numbers are rendered in decimal and the publisher id in lowercase hex.
//! The signature travels as `0x`-prefixed hex of `r ‖ s ‖ v`. A message is
//! valid when the recovered signer is in the stream's publisher set.

use std::collections::HashSet;

use shared_crypto::{recover_eth_address, CryptoError, Secp256k1KeyPair};
use shared_types::{Address, StreamMessage};

/// Canonical byte string covered by a message signature.
pub fn signature_payload(msg: &StreamMessage) -> String {
    let id = msg.message_id();
    let mut payload = format!(
        "{}{}{}{}{}{}",
        id.stream_id,
        id.partition,
        id.message_ref.timestamp,
        id.message_ref.sequence_number,
        id.publisher_id,
        id.msg_chain_id
    );
    if let Some(prev) = msg.prev_msg_ref() {
        payload.push_str(&format!("{}{}", prev.timestamp, prev.sequence_number));
    }
    payload.push_str(msg.serialized_content());
    if let Some(key) = msg.new_group_key() {
        payload.push_str(&key.group_key_id);
        payload.push_str(&key.encrypted_group_key_hex);
    }
    payload
}

/// Signs `msg` with `keypair`, returning the message with its signature set.
///
/// Must run on the content as it will be transmitted (ciphertext for
/// encrypted messages).
pub fn sign_message(
    msg: StreamMessage,
    keypair: &Secp256k1KeyPair,
) -> Result<StreamMessage, CryptoError> {
    let signature = keypair.sign_eth_message(signature_payload(&msg).as_bytes())?;
    Ok(msg.with_signature(format!("0x{}", hex::encode(signature))))
}

/// Address that produced the signature on `msg`.
pub fn recover_signer(msg: &StreamMessage) -> Result<Address, CryptoError> {
    let signature = msg.signature().ok_or(CryptoError::InvalidSignatureFormat)?;
    let bytes = hex::decode(signature.trim_start_matches("0x"))
        .map_err(|_| CryptoError::InvalidSignatureFormat)?;
    let signer = recover_eth_address(signature_payload(msg).as_bytes(), &bytes)?;
    Ok(Address::from_bytes(signer))
}

/// `true` iff `msg` is signed by a member of `publishers`.
pub fn has_valid_signature(msg: &StreamMessage, publishers: &HashSet<Address>) -> bool {
    match recover_signer(msg) {
        Ok(signer) => publishers.contains(&signer),
        Err(_) => false,
    }
}
