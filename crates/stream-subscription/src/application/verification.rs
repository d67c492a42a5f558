//! # Signature Verification
//!
//! Decides whether a message is acceptable under the configured policy,
//! using cached stream metadata and publisher sets.
//!
//! | Policy   | Signed message        | Unsigned message                 |
//! |----------|-----------------------|----------------------------------|
//! | `ALWAYS` | signer in publishers  | invalid                          |
//! | `AUTO`   | signer in publishers  | valid unless stream requires it  |
//! | `NEVER`  | valid                 | valid                            |
//!
//! Cache entries expire lazily; a fetch happens outside the cache lock, so
//! two concurrent misses may both fetch.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use shared_types::{Address, StreamMessage, StreamMetadata};
use stream_telemetry::SIGNATURE_VERIFICATIONS;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::{SignatureVerificationPolicy, VerificationConfig};
use crate::domain::{has_valid_signature, SubscriptionError, TtlCache};
use crate::ports::StreamMetadataSource;

/// Cached view of the streams a client is subscribed to.
pub struct SubscribedStreams {
    source: Arc<dyn StreamMetadataSource>,
    policy: SignatureVerificationPolicy,
    streams: Mutex<TtlCache<String, StreamMetadata>>,
    publishers: Mutex<TtlCache<String, HashSet<Address>>>,
}

impl SubscribedStreams {
    pub fn new(source: Arc<dyn StreamMetadataSource>, config: VerificationConfig) -> Self {
        Self {
            source,
            policy: config.policy,
            streams: Mutex::new(TtlCache::new(config.stream_cache_ttl())),
            publishers: Mutex::new(TtlCache::new(config.publisher_cache_ttl())),
        }
    }

    pub fn policy(&self) -> SignatureVerificationPolicy {
        self.policy
    }

    /// Checks `msg` against the policy.
    ///
    /// # Errors
    ///
    /// `InvalidSignature` when the message is rejected, `MetadataFetch` when
    /// the metadata needed for the decision is unavailable.
    pub async fn verify_stream_message(&self, msg: &StreamMessage) -> Result<(), SubscriptionError> {
        let valid = match self.policy {
            SignatureVerificationPolicy::Never => {
                SIGNATURE_VERIFICATIONS.with_label_values(&["skipped"]).inc();
                return Ok(());
            }
            SignatureVerificationPolicy::Always => self.signed_by_publisher(msg).await?,
            SignatureVerificationPolicy::Auto => {
                if msg.signature().is_some() {
                    self.signed_by_publisher(msg).await?
                } else {
                    !self.stream_metadata(msg.stream_id()).await?.requires_signed_data
                }
            }
        };

        if valid {
            SIGNATURE_VERIFICATIONS.with_label_values(&["valid"]).inc();
            Ok(())
        } else {
            SIGNATURE_VERIFICATIONS.with_label_values(&["invalid"]).inc();
            warn!(
                stream_id = msg.stream_id(),
                publisher = %msg.publisher_id(),
                message_ref = %msg.message_ref(),
                "Rejecting message with invalid signature"
            );
            Err(SubscriptionError::InvalidSignature {
                stream_id: msg.stream_id().to_string(),
                message_ref: msg.message_ref(),
                publisher_id: msg.publisher_id().clone(),
            })
        }
    }

    /// Metadata of `stream_id`, fetched at most once per TTL.
    pub async fn stream_metadata(&self, stream_id: &str) -> Result<StreamMetadata, SubscriptionError> {
        let key = stream_id.to_string();
        let cached = self.streams.lock().get(&key, Instant::now());
        if let Some(cached) = cached {
            return Ok(cached);
        }
        debug!(stream_id, "Fetching stream metadata");
        let metadata = self.source.fetch_stream(stream_id).await?;
        self.streams.lock().insert(key, metadata.clone(), Instant::now());
        Ok(metadata)
    }

    /// Publisher set of `stream_id`, fetched at most once per TTL.
    pub async fn publishers(&self, stream_id: &str) -> Result<HashSet<Address>, SubscriptionError> {
        let key = stream_id.to_string();
        let cached = self.publishers.lock().get(&key, Instant::now());
        if let Some(cached) = cached {
            return Ok(cached);
        }
        debug!(stream_id, "Fetching stream publishers");
        let publishers: HashSet<Address> = self
            .source
            .fetch_publishers(stream_id)
            .await?
            .into_iter()
            .collect();
        self.publishers
            .lock()
            .insert(key, publishers.clone(), Instant::now());
        Ok(publishers)
    }

    async fn signed_by_publisher(&self, msg: &StreamMessage) -> Result<bool, SubscriptionError> {
        if msg.signature().is_none() {
            return Ok(false);
        }
        let publishers = self.publishers(msg.stream_id()).await?;
        Ok(has_valid_signature(msg, &publishers))
    }
}
