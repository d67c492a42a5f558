//! # Domain Errors
//!
//! Error types for the subscription engine.

use shared_crypto::CryptoError;
use shared_types::{Address, ContentError, MessageRef, StreamMessage};
use thiserror::Error;

use super::chain::Gap;

/// A message that could not be decrypted even after its key was requested.
///
/// This is the value handed to the consumer's failure callback.
#[derive(Clone, Debug, Error)]
#[error("Unable to decrypt message {} from {} in stream {}: {reason}",
    .message.message_ref(), .message.publisher_id(), .message.stream_id())]
pub struct UnableToDecrypt {
    /// The message, still carrying its ciphertext.
    pub message: Box<StreamMessage>,
    /// Key the message was encrypted with, if it named one.
    pub group_key_id: Option<String>,
    /// Why the last attempt failed.
    pub reason: String,
}

impl UnableToDecrypt {
    pub fn new(message: StreamMessage, reason: impl Into<String>) -> Self {
        Self {
            group_key_id: message.group_key_id().map(str::to_string),
            message: Box::new(message),
            reason: reason.into(),
        }
    }
}

/// Subscription error types.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// A chain is missing messages; raised by the default gap handler.
    #[error("Gap detected: {0}")]
    GapDetected(Gap),

    /// A gap stayed open after every permitted report.
    #[error("Gap not filled after {attempts} requests: {gap}")]
    GapFillFailed {
        /// The gap that stayed open
        gap: Gap,
        /// Reports issued
        attempts: u32,
    },

    /// Permanent decryption failure.
    #[error(transparent)]
    UnableToDecrypt(#[from] UnableToDecrypt),

    /// Signature missing or not from a stream publisher.
    #[error("Invalid signature on message {message_ref} from {publisher_id} in stream {stream_id}")]
    InvalidSignature {
        /// Stream the message was published to
        stream_id: String,
        /// Position of the message in its chain
        message_ref: MessageRef,
        /// Claimed publisher
        publisher_id: Address,
    },

    /// Stream metadata or publisher list could not be fetched.
    #[error("Failed to fetch metadata for stream {stream_id}: {reason}")]
    MetadataFetch {
        /// Stream being looked up
        stream_id: String,
        /// Underlying failure
        reason: String,
    },

    /// The key-exchange collaborator rejected a key.
    #[error("Key exchange failed: {0}")]
    KeyExchange(String),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No runtime available to drive timers.
    #[error("Scheduler unavailable: {0}")]
    Scheduler(String),

    /// Content is still encrypted or not valid JSON.
    #[error("Content not parsable: {0}")]
    ContentNotParsable(#[from] ContentError),

    /// The cipher primitive failed.
    #[error("Decryption failed: {0}")]
    Decryption(#[from] CryptoError),
}
