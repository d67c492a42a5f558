//! # Control-Message Adapters
//!
//! Turn the engine's two outgoing intents into wire messages for the
//! transport: group-key requests to a publisher, and resend requests for a
//! gap. Each request gets a fresh UUID request id.

use std::sync::Arc;

use shared_types::{Address, GroupKeyRequest, ResendFromRequest};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Gap, SubscriptionError};
use crate::ports::{GapHandler, GroupKeyRequester};

/// Transport hook for a key request addressed to a publisher.
pub type KeyRequestSink = Arc<dyn Fn(&Address, String) + Send + Sync>;

/// Transport hook for a control message.
pub type ControlSink = Arc<dyn Fn(String) + Send + Sync>;

/// Encodes key requests as [`GroupKeyRequest`] content.
pub struct WireGroupKeyRequester {
    stream_id: String,
    rsa_public_key: String,
    sink: KeyRequestSink,
}

impl WireGroupKeyRequester {
    pub fn new(
        stream_id: impl Into<String>,
        rsa_public_key: impl Into<String>,
        sink: KeyRequestSink,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            rsa_public_key: rsa_public_key.into(),
            sink,
        }
    }
}

impl GroupKeyRequester for WireGroupKeyRequester {
    fn request_group_keys(&self, publisher_id: &Address, group_key_ids: Vec<String>) {
        let request = GroupKeyRequest::new(
            Uuid::new_v4().to_string(),
            self.stream_id.clone(),
            self.rsa_public_key.clone(),
            group_key_ids,
        );
        debug!(
            stream_id = %self.stream_id,
            publisher = %publisher_id,
            request_id = %request.request_id,
            "Encoding group key request"
        );
        (self.sink)(publisher_id, request.to_json());
    }
}

/// Gap policy that asks the network to resend the chain from the gap start.
pub struct ResendGapHandler {
    session_token: Option<String>,
    sink: ControlSink,
}

impl ResendGapHandler {
    pub fn new(session_token: Option<String>, sink: ControlSink) -> Self {
        Self {
            session_token,
            sink,
        }
    }
}

impl GapHandler for ResendGapHandler {
    fn handle_gap(&self, gap: &Gap) -> Result<(), SubscriptionError> {
        let mut request = ResendFromRequest::new(
            gap.stream_id.clone(),
            gap.partition,
            Uuid::new_v4().to_string(),
            gap.from,
        )
        .for_chain(gap.publisher_id.clone(), gap.msg_chain_id.clone());
        if let Some(token) = &self.session_token {
            request = request.with_session_token(token.clone());
        }
        debug!(gap = %gap, request_id = %request.request_id, "Requesting resend for gap");
        (self.sink)(request.to_json());
        Ok(())
    }
}
