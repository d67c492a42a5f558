//! # Error Types
//!
//! Defines error types for the message model and the wire codec.

use thiserror::Error;

/// Errors raised while reading message content.
#[derive(Debug, Error)]
pub enum ContentError {
    /// Content is still ciphertext and cannot be parsed.
    #[error("Content of message type {message_type} is encrypted and cannot be parsed")]
    StillEncrypted { message_type: u8 },

    /// Plaintext is not valid JSON.
    #[error("Content is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while building a group key from external input.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum KeyError {
    #[error("Invalid key hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// Errors raised by the positional wire codec.
#[derive(Debug, Error)]
pub enum WireError {
    /// The JSON text could not be parsed at all.
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload is not an array of the expected length.
    #[error("Unexpected field count: expected {expected}, got {actual}")]
    Arity { expected: usize, actual: usize },

    /// A field has the wrong JSON type.
    #[error("Invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// The control message type does not match the decoder.
    #[error("Unexpected control message type: expected {expected}, got {actual}")]
    UnexpectedType { expected: u8, actual: u64 },

    /// The protocol version is not supported.
    #[error("Unsupported version: received {received}, supported {supported}")]
    UnsupportedVersion { received: u64, supported: u8 },
}
