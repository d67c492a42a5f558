//! # Positional Wire Codec
//!
//! Control and key-exchange requests travel as JSON arrays whose meaning is
//! given by position. This module owns the two layouts the subscription
//! engine needs to round-trip:
//!
//! ```text
//! ResendFromRequest: [version, 12, streamId, partition, requestId,
//!                     [fromTimestamp, fromSequenceNumber],
//!                     publisherId|null, msgChainId|null, sessionToken|null]
//! GroupKeyRequest:   [requestId, streamId, rsaPublicKey, [groupKeyId, ...]]
//! ```
//!
//! The resend decoder also accepts the flattened
//! `..., fromTimestamp, fromSequenceNumber, ...` variant.

use serde_json::{json, Value};

use crate::entities::{Address, MessageRef};
use crate::errors::WireError;

/// Control layer version written by the encoder.
pub const CONTROL_LAYER_VERSION: u8 = 1;

/// Request to resend a chain starting at `from`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResendFromRequest {
    pub stream_id: String,
    pub partition: u32,
    pub request_id: String,
    pub from: MessageRef,
    pub publisher_id: Option<Address>,
    pub msg_chain_id: Option<String>,
    pub session_token: Option<String>,
}

impl ResendFromRequest {
    /// Control message type id.
    pub const TYPE: u8 = 12;

    pub fn new(
        stream_id: impl Into<String>,
        partition: u32,
        request_id: impl Into<String>,
        from: MessageRef,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            partition,
            request_id: request_id.into(),
            from,
            publisher_id: None,
            msg_chain_id: None,
            session_token: None,
        }
    }

    /// Builder method: restrict the resend to one chain.
    pub fn for_chain(mut self, publisher_id: Address, msg_chain_id: impl Into<String>) -> Self {
        self.publisher_id = Some(publisher_id);
        self.msg_chain_id = Some(msg_chain_id.into());
        self
    }

    /// Builder method: attach the session token.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn to_json_value(&self) -> Value {
        json!([
            CONTROL_LAYER_VERSION,
            Self::TYPE,
            self.stream_id,
            self.partition,
            self.request_id,
            [self.from.timestamp, self.from.sequence_number],
            self.publisher_id.as_ref().map(Address::as_str),
            self.msg_chain_id,
            self.session_token,
        ])
    }

    pub fn to_json(&self) -> String {
        self.to_json_value().to_string()
    }

    /// Decodes either the nested or the flattened layout.
    ///
    /// # Errors
    ///
    /// Returns `WireError` on malformed JSON, wrong arity, wrong control
    /// type or an unsupported version.
    pub fn from_json(input: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(input)?;
        let fields = as_array(&value, "message")?;
        if fields.len() < 2 {
            return Err(WireError::Arity {
                expected: 9,
                actual: fields.len(),
            });
        }

        let version = u64_field(&fields[0], "version")?;
        if version != u64::from(CONTROL_LAYER_VERSION) {
            return Err(WireError::UnsupportedVersion {
                received: version,
                supported: CONTROL_LAYER_VERSION,
            });
        }
        let message_type = u64_field(&fields[1], "type")?;
        if message_type != u64::from(Self::TYPE) {
            return Err(WireError::UnexpectedType {
                expected: Self::TYPE,
                actual: message_type,
            });
        }

        let (from, tail) = match fields.len() {
            9 => {
                let pair = as_array(&fields[5], "fromMsgRef")?;
                if pair.len() != 2 {
                    return Err(WireError::InvalidField {
                        field: "fromMsgRef",
                        reason: format!("expected 2 elements, got {}", pair.len()),
                    });
                }
                let from = MessageRef::new(
                    i64_field(&pair[0], "fromTimestamp")?,
                    i64_field(&pair[1], "fromSequenceNumber")?,
                );
                (from, &fields[6..])
            }
            10 => {
                let from = MessageRef::new(
                    i64_field(&fields[5], "fromTimestamp")?,
                    i64_field(&fields[6], "fromSequenceNumber")?,
                );
                (from, &fields[7..])
            }
            actual => return Err(WireError::Arity { expected: 9, actual }),
        };

        let partition = u64_field(&fields[3], "partition")?;
        Ok(Self {
            stream_id: str_field(&fields[2], "streamId")?,
            partition: u32::try_from(partition).map_err(|_| WireError::InvalidField {
                field: "partition",
                reason: format!("{partition} does not fit in u32"),
            })?,
            request_id: str_field(&fields[4], "requestId")?,
            from,
            publisher_id: opt_str_field(&tail[0], "publisherId")?.map(Address::new),
            msg_chain_id: opt_str_field(&tail[1], "msgChainId")?,
            session_token: opt_str_field(&tail[2], "sessionToken")?,
        })
    }
}

/// Content of a group-key request sent to a publisher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupKeyRequest {
    pub request_id: String,
    pub stream_id: String,
    pub rsa_public_key: String,
    pub group_key_ids: Vec<String>,
}

impl GroupKeyRequest {
    pub fn new(
        request_id: impl Into<String>,
        stream_id: impl Into<String>,
        rsa_public_key: impl Into<String>,
        group_key_ids: Vec<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            stream_id: stream_id.into(),
            rsa_public_key: rsa_public_key.into(),
            group_key_ids,
        }
    }

    pub fn to_json(&self) -> String {
        json!([
            self.request_id,
            self.stream_id,
            self.rsa_public_key,
            self.group_key_ids,
        ])
        .to_string()
    }

    /// # Errors
    ///
    /// Returns `WireError` on malformed JSON or a layout mismatch.
    pub fn from_json(input: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(input)?;
        let fields = as_array(&value, "message")?;
        if fields.len() != 4 {
            return Err(WireError::Arity {
                expected: 4,
                actual: fields.len(),
            });
        }
        let group_key_ids = as_array(&fields[3], "groupKeyIds")?
            .iter()
            .map(|id| str_field(id, "groupKeyIds"))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            request_id: str_field(&fields[0], "requestId")?,
            stream_id: str_field(&fields[1], "streamId")?,
            rsa_public_key: str_field(&fields[2], "rsaPublicKey")?,
            group_key_ids,
        })
    }
}

// =============================================================================
// FIELD HELPERS
// =============================================================================

fn as_array<'a>(value: &'a Value, field: &'static str) -> Result<&'a Vec<Value>, WireError> {
    value.as_array().ok_or_else(|| WireError::InvalidField {
        field,
        reason: "expected an array".to_string(),
    })
}

fn str_field(value: &Value, field: &'static str) -> Result<String, WireError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| WireError::InvalidField {
            field,
            reason: "expected a string".to_string(),
        })
}

fn opt_str_field(value: &Value, field: &'static str) -> Result<Option<String>, WireError> {
    if value.is_null() {
        return Ok(None);
    }
    str_field(value, field).map(Some)
}

fn u64_field(value: &Value, field: &'static str) -> Result<u64, WireError> {
    value.as_u64().ok_or_else(|| WireError::InvalidField {
        field,
        reason: "expected an unsigned integer".to_string(),
    })
}

fn i64_field(value: &Value, field: &'static str) -> Result<i64, WireError> {
    value.as_i64().ok_or_else(|| WireError::InvalidField {
        field,
        reason: "expected an integer".to_string(),
    })
}
