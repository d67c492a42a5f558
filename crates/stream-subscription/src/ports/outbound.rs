//! # Outbound Ports
//!
//! Traits for the collaborators a subscription drives: key storage, key
//! exchange, the transport's key-request and resend paths, the consumer, and
//! the metadata REST client.

use async_trait::async_trait;
use shared_types::{Address, EncryptedGroupKey, GroupKey, StreamMessage, StreamMetadata, StreamPartition};

use crate::domain::{Gap, SubscriptionError, UnableToDecrypt};

/// Group key storage - outbound port.
pub trait GroupKeyStore: Send + Sync {
    /// Key `group_key_id` of `stream_id`, if known.
    fn get(&self, stream_id: &str, group_key_id: &str) -> Option<GroupKey>;
}

/// Key-exchange collaborator - outbound port.
///
/// Receives rotated keys embedded in delivered messages. Once a key is
/// usable it is expected to report back through
/// [`Subscription::on_new_keys_added`](crate::ports::Subscription::on_new_keys_added).
pub trait KeyExchange: Send + Sync {
    /// `keys` arrived in a message from `publisher_id` that was encrypted
    /// with `group_key_id`.
    fn handle_new_encrypted_keys(
        &self,
        keys: Vec<EncryptedGroupKey>,
        stream_id: &str,
        publisher_id: &Address,
        group_key_id: Option<&str>,
    ) -> Result<(), SubscriptionError>;
}

/// Sends a group-key request to a publisher - outbound port.
///
/// Fire and forget; the answer arrives through the key exchange.
pub trait GroupKeyRequester: Send + Sync {
    /// Ask `publisher_id` for `group_key_ids`.
    fn request_group_keys(&self, publisher_id: &Address, group_key_ids: Vec<String>);
}

impl<F> GroupKeyRequester for F
where
    F: Fn(&Address, Vec<String>) + Send + Sync,
{
    fn request_group_keys(&self, publisher_id: &Address, group_key_ids: Vec<String>) {
        self(publisher_id, group_key_ids)
    }
}

/// Reacts to a gap that outlived the propagation timeout - outbound port.
///
/// Called from a timer task. Returning an error stops further reports for
/// that gap; the chain keeps its buffered messages.
pub trait GapHandler: Send + Sync {
    /// Handle `gap`, typically by requesting a resend of `gap.from..=gap.to`.
    fn handle_gap(&self, gap: &Gap) -> Result<(), SubscriptionError>;
}

impl<F> GapHandler for F
where
    F: Fn(&Gap) -> Result<(), SubscriptionError> + Send + Sync,
{
    fn handle_gap(&self, gap: &Gap) -> Result<(), SubscriptionError> {
        self(gap)
    }
}

/// Gap policy that treats every gap as fatal for the chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailOnGap;

impl GapHandler for FailOnGap {
    fn handle_gap(&self, gap: &Gap) -> Result<(), SubscriptionError> {
        Err(SubscriptionError::GapDetected(gap.clone()))
    }
}

/// Consumer callbacks - outbound port.
pub trait MessageHandler: Send + Sync {
    /// A decrypted message, in chain order.
    fn on_message(&self, subscription: &StreamPartition, msg: StreamMessage);

    /// A message that stays undecryptable after its key was requested.
    fn on_unable_to_decrypt(&self, error: UnableToDecrypt);
}

/// Stream metadata REST client - outbound port.
#[async_trait]
pub trait StreamMetadataSource: Send + Sync {
    /// Metadata of `stream_id`.
    async fn fetch_stream(&self, stream_id: &str) -> Result<StreamMetadata, SubscriptionError>;

    /// Addresses allowed to publish to `stream_id`.
    async fn fetch_publishers(&self, stream_id: &str) -> Result<Vec<Address>, SubscriptionError>;
}

/// Symmetric decrypt primitive - outbound port.
pub trait MessageDecryptor: Send + Sync {
    /// Replaces the ciphertext of `msg` with plaintext decrypted under `key`.
    ///
    /// On error `msg` is left untouched.
    fn decrypt(&self, msg: &mut StreamMessage, key: &GroupKey) -> Result<(), SubscriptionError>;
}
