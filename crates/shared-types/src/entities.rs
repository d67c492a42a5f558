//! # Core Domain Entities
//!
//! Defines the message model exchanged between the transport, the
//! subscription engine and the consumer.
//!
//! ## Clusters
//!
//! - **Identity**: `MessageRef`, `MessageId`, `Address`, `StreamPartition`
//! - **Content**: `StreamMessage`, `MessageType`, `EncryptionType`
//! - **Keys**: `GroupKey`, `EncryptedGroupKey`
//! - **Metadata**: `StreamMetadata`

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{ContentError, KeyError};

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

/// Position of a message inside its chain.
///
/// Ordering is lexicographic on `(timestamp, sequence_number)`; the derived
/// `Ord` relies on the field order below.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MessageRef {
    /// Publisher wall-clock timestamp in milliseconds.
    pub timestamp: i64,
    /// Sequence number among messages sharing the same timestamp.
    pub sequence_number: i64,
}

impl MessageRef {
    pub fn new(timestamp: i64, sequence_number: i64) -> Self {
        Self {
            timestamp,
            sequence_number,
        }
    }

    /// The smallest ref strictly greater than `self` with the same timestamp.
    pub fn successor(&self) -> Self {
        Self::new(self.timestamp, self.sequence_number + 1)
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.timestamp, self.sequence_number)
    }
}

impl Serialize for MessageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.timestamp, self.sequence_number).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MessageRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (timestamp, sequence_number) = <(i64, i64)>::deserialize(deserializer)?;
        Ok(Self::new(timestamp, sequence_number))
    }
}

/// Ethereum-style account address, stored as lowercase `0x`-prefixed hex.
///
/// Publisher ids and the members of a stream's publisher set are compared
/// as addresses, so normalisation happens once at construction.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl AsRef<str>) -> Self {
        let raw = address.as_ref().trim();
        let body = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .unwrap_or(raw);
        Self(format!("0x{}", body.to_ascii_lowercase()))
    }

    /// Build an address from its 20 raw bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(raw))
    }
}

/// A single partition of a stream; the unit a subscription is bound to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StreamPartition {
    pub stream_id: String,
    pub partition: u32,
}

impl StreamPartition {
    pub fn new(stream_id: impl Into<String>, partition: u32) -> Self {
        Self {
            stream_id: stream_id.into(),
            partition,
        }
    }
}

impl fmt::Display for StreamPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.stream_id, self.partition)
    }
}

/// Full identity of a message: where it lives and its place in its chain.
///
/// Serialises as the positional array
/// `[streamId, partition, timestamp, sequenceNumber, publisherId, msgChainId]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageId {
    pub stream_id: String,
    pub partition: u32,
    pub message_ref: MessageRef,
    pub publisher_id: Address,
    pub msg_chain_id: String,
}

impl MessageId {
    pub fn new(
        stream_id: impl Into<String>,
        partition: u32,
        timestamp: i64,
        sequence_number: i64,
        publisher_id: Address,
        msg_chain_id: impl Into<String>,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            partition,
            message_ref: MessageRef::new(timestamp, sequence_number),
            publisher_id,
            msg_chain_id: msg_chain_id.into(),
        }
    }
}

type MessageIdWire = (String, u32, i64, i64, String, String);

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (
            &self.stream_id,
            self.partition,
            self.message_ref.timestamp,
            self.message_ref.sequence_number,
            self.publisher_id.as_str(),
            &self.msg_chain_id,
        )
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (stream_id, partition, timestamp, sequence_number, publisher_id, msg_chain_id) =
            MessageIdWire::deserialize(deserializer)?;
        if stream_id.is_empty() {
            return Err(D::Error::custom("message id has an empty stream id"));
        }
        Ok(Self::new(
            stream_id,
            partition,
            timestamp,
            sequence_number,
            Address::new(publisher_id),
            msg_chain_id,
        ))
    }
}

// =============================================================================
// CLUSTER B: CONTENT
// =============================================================================

/// Kind of message carried on a stream.
///
/// Only `StreamMessage` carries consumer content; the group-key variants are
/// key-exchange control traffic handled outside the subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum MessageType {
    #[default]
    StreamMessage,
    GroupKeyRequest,
    GroupKeyResponse,
    GroupKeyAnnounce,
    GroupKeyErrorResponse,
}

impl MessageType {
    /// Numeric id used on the wire.
    pub fn id(&self) -> u8 {
        match self {
            Self::StreamMessage => 27,
            Self::GroupKeyRequest => 28,
            Self::GroupKeyResponse => 29,
            Self::GroupKeyAnnounce => 30,
            Self::GroupKeyErrorResponse => 31,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            27 => Some(Self::StreamMessage),
            28 => Some(Self::GroupKeyRequest),
            29 => Some(Self::GroupKeyResponse),
            30 => Some(Self::GroupKeyAnnounce),
            31 => Some(Self::GroupKeyErrorResponse),
            _ => None,
        }
    }
}

/// How the content of a message is protected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum EncryptionType {
    #[default]
    None,
    Aes,
}

/// A message received on a stream partition.
///
/// Built once through [`StreamMessage::new`] and the `with_*` builders. The
/// only later mutation is [`StreamMessage::replace_with_plaintext`], applied
/// by the decrypt step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamMessage {
    message_id: MessageId,
    prev_msg_ref: Option<MessageRef>,
    message_type: MessageType,
    encryption_type: EncryptionType,
    group_key_id: Option<String>,
    serialized_content: String,
    new_group_key: Option<EncryptedGroupKey>,
    signature: Option<String>,
}

impl StreamMessage {
    /// Creates an unencrypted, unsigned content message.
    pub fn new(message_id: MessageId, serialized_content: impl Into<String>) -> Self {
        Self {
            message_id,
            prev_msg_ref: None,
            message_type: MessageType::StreamMessage,
            encryption_type: EncryptionType::None,
            group_key_id: None,
            serialized_content: serialized_content.into(),
            new_group_key: None,
            signature: None,
        }
    }

    /// Builder method: link to the previous message of the chain.
    pub fn with_prev_msg_ref(mut self, prev: MessageRef) -> Self {
        self.prev_msg_ref = Some(prev);
        self
    }

    /// Builder method: set the message type.
    pub fn with_message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }

    /// Builder method: mark the content as AES ciphertext under `group_key_id`.
    pub fn with_encryption(mut self, group_key_id: impl Into<String>) -> Self {
        self.encryption_type = EncryptionType::Aes;
        self.group_key_id = Some(group_key_id.into());
        self
    }

    /// Builder method: attach a rotated key encrypted with the current key.
    pub fn with_new_group_key(mut self, key: EncryptedGroupKey) -> Self {
        self.new_group_key = Some(key);
        self
    }

    /// Builder method: attach the publisher's signature.
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    pub fn message_ref(&self) -> MessageRef {
        self.message_id.message_ref
    }

    pub fn prev_msg_ref(&self) -> Option<MessageRef> {
        self.prev_msg_ref
    }

    pub fn stream_id(&self) -> &str {
        &self.message_id.stream_id
    }

    pub fn partition(&self) -> u32 {
        self.message_id.partition
    }

    pub fn publisher_id(&self) -> &Address {
        &self.message_id.publisher_id
    }

    pub fn msg_chain_id(&self) -> &str {
        &self.message_id.msg_chain_id
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn encryption_type(&self) -> EncryptionType {
        self.encryption_type
    }

    pub fn group_key_id(&self) -> Option<&str> {
        self.group_key_id.as_deref()
    }

    pub fn serialized_content(&self) -> &str {
        &self.serialized_content
    }

    pub fn new_group_key(&self) -> Option<&EncryptedGroupKey> {
        self.new_group_key.as_ref()
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// Parses the plaintext content as JSON.
    ///
    /// # Errors
    ///
    /// - `ContentError::StillEncrypted` if the message has not been decrypted
    /// - `ContentError::Json` if the plaintext is not valid JSON
    pub fn content_json(&self) -> Result<serde_json::Value, ContentError> {
        if self.encryption_type != EncryptionType::None {
            return Err(ContentError::StillEncrypted {
                message_type: self.message_type.id(),
            });
        }
        Ok(serde_json::from_str(&self.serialized_content)?)
    }

    /// Swaps ciphertext for plaintext. Called once, by the decrypt step.
    pub fn replace_with_plaintext(&mut self, plaintext: String) {
        self.serialized_content = plaintext;
        self.encryption_type = EncryptionType::None;
    }
}

// =============================================================================
// CLUSTER C: KEYS
// =============================================================================

/// Symmetric AES-256 group key identified by `group_key_id`.
#[derive(Clone, PartialEq, Eq)]
pub struct GroupKey {
    group_key_id: String,
    key: [u8; 32],
}

impl GroupKey {
    pub fn new(group_key_id: impl Into<String>, key: [u8; 32]) -> Self {
        Self {
            group_key_id: group_key_id.into(),
            key,
        }
    }

    /// Parses a 64-character hex key.
    ///
    /// # Errors
    ///
    /// Returns `KeyError` on bad hex or a key that is not 32 bytes long.
    pub fn from_hex(group_key_id: impl Into<String>, key_hex: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(key_hex.trim_start_matches("0x"))?;
        let key: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidLength(bytes.len()))?;
        Ok(Self::new(group_key_id, key))
    }

    pub fn group_key_id(&self) -> &str {
        &self.group_key_id
    }

    pub fn key_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    pub fn key_hex(&self) -> String {
        hex::encode(self.key)
    }
}

impl fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupKey")
            .field("group_key_id", &self.group_key_id)
            .finish_non_exhaustive()
    }
}

/// A group key encrypted with another key, as embedded in a rotating message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedGroupKey {
    pub group_key_id: String,
    pub encrypted_group_key_hex: String,
}

impl EncryptedGroupKey {
    pub fn new(group_key_id: impl Into<String>, encrypted_group_key_hex: impl Into<String>) -> Self {
        Self {
            group_key_id: group_key_id.into(),
            encrypted_group_key_hex: encrypted_group_key_hex.into(),
        }
    }
}

// =============================================================================
// CLUSTER D: METADATA
// =============================================================================

/// Stream metadata as returned by the REST API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamMetadata {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_partitions")]
    pub partitions: u32,
    #[serde(default)]
    pub requires_signed_data: bool,
    #[serde(default)]
    pub requires_encrypted_data: bool,
}

fn default_partitions() -> u32 {
    1
}

impl StreamMetadata {
    pub fn new(id: impl Into<String>, requires_signed_data: bool) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            partitions: default_partitions(),
            requires_signed_data,
            requires_encrypted_data: false,
        }
    }
}
