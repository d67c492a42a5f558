//! # Basic Subscription
//!
//! Composes the chain orderer, the decryption-blocked queue and the
//! group-key request machine for one stream partition.
//!
//! ## Message Flow
//!
//! ```text
//! handle_*_message ──▶ OrderingUtil ──in order──▶ handle_in_order
//!                                                     │
//!                      key request pending? ──yes──▶ DecryptionQueues
//!                                                     │ no
//!                                                     ▼
//!                                                 try_decrypt
//!                          ┌──────────────────────────┼───────────────────────┐
//!                       decrypted                  transient               permanent
//!                          │                          │                       │
//!              on_message + forward new key   queue + request key   on_unable_to_decrypt
//!
//! on_new_keys_added ──▶ resolve requests ──▶ drain queue ──▶ try_decrypt again
//! ```
//!
//! A key id that fails once is remembered; a second failure for it before
//! any success is permanent.
//!
//! ## Locking
//!
//! Every entry point, and every key-request tick, runs under one reentrant
//! `processing` lock. Callbacks may re-enter the subscription on the same
//! thread (a key exchange that answers synchronously, a handler that feeds
//! resent messages back).

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use shared_types::{Address, EncryptionType, GroupKey, MessageType, StreamMessage, StreamPartition};
use stream_telemetry::{DECRYPTION_FAILURES, MESSAGES_DELIVERED};
use tracing::{debug, error, trace, warn};

use super::key_requests::{GroupKeyRequestMachine, KeyRequestState};
use super::ordering::{ChainSnapshot, InOrderHandler, OrderingUtil};
use super::scheduler::TaskScheduler;
use crate::config::SubscriptionConfig;
use crate::domain::{DecryptionQueues, SubscriptionError, UnableToDecrypt};
use crate::ports::{
    FailOnGap, GapHandler, GroupKeyRequester, GroupKeyStore, KeyExchange, MessageDecryptor,
    MessageHandler, Subscription,
};

/// Collaborators a subscription drives.
#[derive(Clone)]
pub struct SubscriptionPorts {
    pub handler: Arc<dyn MessageHandler>,
    pub key_store: Arc<dyn GroupKeyStore>,
    pub key_exchange: Arc<dyn KeyExchange>,
    /// Sends key requests. Without one, requests are only logged.
    pub key_requester: Option<Arc<dyn GroupKeyRequester>>,
    pub decryptor: Arc<dyn MessageDecryptor>,
}

enum DecryptOutcome {
    Ready,
    KeyMissing,
}

struct SubscriptionInner {
    stream: StreamPartition,
    handler: Arc<dyn MessageHandler>,
    key_store: Arc<dyn GroupKeyStore>,
    key_exchange: Arc<dyn KeyExchange>,
    decryptor: Arc<dyn MessageDecryptor>,
    processing: Arc<ReentrantMutex<()>>,
    orderer: OrderingUtil,
    key_requests: GroupKeyRequestMachine,
    queues: Mutex<DecryptionQueues>,
    failed_once: Mutex<HashSet<String>>,
}

/// Subscription to one stream partition.
#[derive(Clone)]
pub struct BasicSubscription {
    inner: Arc<SubscriptionInner>,
}

/// Non-owning handle, for callbacks registered with collaborators the
/// subscription itself holds.
#[derive(Clone)]
pub struct WeakSubscription {
    inner: Weak<SubscriptionInner>,
}

impl WeakSubscription {
    pub fn upgrade(&self) -> Option<BasicSubscription> {
        self.inner.upgrade().map(|inner| BasicSubscription { inner })
    }
}

impl BasicSubscription {
    /// Subscription whose timers run on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// `SubscriptionError::InvalidConfig` for out-of-range settings,
    /// `SubscriptionError::Scheduler` when called outside a runtime.
    pub fn new(
        stream: StreamPartition,
        config: SubscriptionConfig,
        ports: SubscriptionPorts,
    ) -> Result<Self, SubscriptionError> {
        config.validate()?;
        let scheduler = Arc::new(TaskScheduler::try_current()?);
        Self::with_scheduler(stream, config, ports, scheduler)
    }

    /// # Errors
    ///
    /// `SubscriptionError::InvalidConfig` for out-of-range settings.
    pub fn with_scheduler(
        stream: StreamPartition,
        config: SubscriptionConfig,
        ports: SubscriptionPorts,
        scheduler: Arc<TaskScheduler>,
    ) -> Result<Self, SubscriptionError> {
        config.validate()?;
        let requester: Arc<dyn GroupKeyRequester> = match ports.key_requester {
            Some(requester) => requester,
            None => {
                let stream_id = stream.stream_id.clone();
                Arc::new(move |publisher: &Address, ids: Vec<String>| {
                    warn!(
                        stream_id = %stream_id,
                        publisher = %publisher,
                        group_key_ids = ?ids,
                        "Group key request dropped: no handler is set"
                    );
                })
            }
        };
        let processing = Arc::new(ReentrantMutex::new(()));

        let inner = Arc::new_cyclic(|this: &Weak<SubscriptionInner>| {
            let weak = this.clone();
            let in_order: InOrderHandler = Arc::new(move |msg: StreamMessage| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_in_order(msg);
                }
            });
            SubscriptionInner {
                orderer: OrderingUtil::new(
                    stream.clone(),
                    config.clone(),
                    scheduler.clone(),
                    in_order,
                    Arc::new(FailOnGap),
                ),
                key_requests: GroupKeyRequestMachine::new(
                    stream.stream_id.clone(),
                    scheduler,
                    requester,
                    config.propagation_timeout(),
                    config.max_group_key_requests,
                    processing.clone(),
                ),
                stream,
                handler: ports.handler,
                key_store: ports.key_store,
                key_exchange: ports.key_exchange,
                decryptor: ports.decryptor,
                processing,
                queues: Mutex::new(DecryptionQueues::new()),
                failed_once: Mutex::new(HashSet::new()),
            }
        });
        Ok(Self { inner })
    }

    pub fn downgrade(&self) -> WeakSubscription {
        WeakSubscription {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Replaces the gap policy. Chains already seen are kept.
    pub fn set_gap_handler(&self, handler: Arc<dyn GapHandler>) {
        self.inner.orderer.set_gap_handler(handler);
    }

    pub fn gap_handler(&self) -> Arc<dyn GapHandler> {
        self.inner.orderer.gap_handler()
    }

    /// Chains seen so far.
    pub fn chains(&self) -> Vec<ChainSnapshot> {
        self.inner.orderer.chains()
    }

    pub fn key_request_state(&self, group_key_id: &str) -> KeyRequestState {
        self.inner.key_requests.state(group_key_id)
    }

    /// Messages waiting for a group key.
    pub fn queued_messages(&self) -> usize {
        self.inner.queues.lock().len()
    }

    /// Messages from `publisher_id` waiting for `group_key_id`.
    pub fn queued_for(&self, publisher_id: &Address, group_key_id: &str) -> usize {
        self.inner.queues.lock().queued_for(publisher_id, group_key_id)
    }
}

impl Subscription for BasicSubscription {
    fn stream_partition(&self) -> &StreamPartition {
        &self.inner.stream
    }

    fn handle_real_time_message(&self, msg: StreamMessage) {
        let _processing = self.inner.processing.lock();
        self.inner.orderer.add(msg);
    }

    fn handle_resent_message(&self, msg: StreamMessage) {
        let _processing = self.inner.processing.lock();
        self.inner.orderer.add(msg);
    }

    fn on_new_keys_added(&self, publisher_id: &Address, group_keys: &[GroupKey]) {
        self.inner.on_new_keys_added(publisher_id, group_keys);
    }

    fn clear(&self) {
        self.inner.orderer.clear_gaps();
    }
}

impl SubscriptionInner {
    fn handle_in_order(&self, msg: StreamMessage) {
        let blocked = msg
            .group_key_id()
            .is_some_and(|id| self.key_requests.is_pending(id));
        if blocked {
            trace!(
                stream_id = msg.stream_id(),
                message_ref = %msg.message_ref(),
                group_key_id = msg.group_key_id(),
                "Key request pending, queueing message"
            );
            self.queues.lock().add(msg);
            return;
        }
        self.decrypt_and_handle(msg);
    }

    fn decrypt_and_handle(&self, mut msg: StreamMessage) {
        match self.try_decrypt(&mut msg) {
            Ok(DecryptOutcome::Ready) => self.deliver(msg),
            Ok(DecryptOutcome::KeyMissing) => {
                let publisher_id = msg.publisher_id().clone();
                let group_key_id = msg.group_key_id().map(str::to_string).unwrap_or_default();
                debug!(
                    stream_id = msg.stream_id(),
                    publisher = %publisher_id,
                    group_key_id = %group_key_id,
                    message_ref = %msg.message_ref(),
                    "Failed to decrypt, requesting group key"
                );
                DECRYPTION_FAILURES.with_label_values(&["transient"]).inc();
                self.queues.lock().add(msg);
                self.key_requests.start(&publisher_id, &group_key_id);
            }
            Err(failure) => {
                error!(
                    stream_id = failure.message.stream_id(),
                    publisher = %failure.message.publisher_id(),
                    group_key_id = ?failure.group_key_id,
                    reason = %failure.reason,
                    "Unable to decrypt message"
                );
                DECRYPTION_FAILURES.with_label_values(&["permanent"]).inc();
                self.handler.on_unable_to_decrypt(failure);
            }
        }
    }

    fn try_decrypt(&self, msg: &mut StreamMessage) -> Result<DecryptOutcome, UnableToDecrypt> {
        if msg.message_type() != MessageType::StreamMessage
            || msg.encryption_type() == EncryptionType::None
        {
            return Ok(DecryptOutcome::Ready);
        }
        let Some(group_key_id) = msg.group_key_id().map(str::to_string) else {
            return Err(UnableToDecrypt::new(msg.clone(), "encrypted message names no group key"));
        };

        let reason = match self.key_store.get(msg.stream_id(), &group_key_id) {
            Some(key) => match self.decryptor.decrypt(msg, &key) {
                Ok(()) => {
                    self.failed_once.lock().remove(&group_key_id);
                    return Ok(DecryptOutcome::Ready);
                }
                Err(e) => e.to_string(),
            },
            None => format!("group key {group_key_id} not found"),
        };

        let mut failed_once = self.failed_once.lock();
        if failed_once.contains(&group_key_id) {
            Err(UnableToDecrypt::new(msg.clone(), reason))
        } else {
            failed_once.insert(group_key_id);
            Ok(DecryptOutcome::KeyMissing)
        }
    }

    fn deliver(&self, msg: StreamMessage) {
        let publisher_id = msg.publisher_id().clone();
        let group_key_id = msg.group_key_id().map(str::to_string);
        let new_key = msg.new_group_key().cloned();

        MESSAGES_DELIVERED.inc();
        self.handler.on_message(&self.stream, msg);

        if let Some(new_key) = new_key {
            if let Err(e) = self.key_exchange.handle_new_encrypted_keys(
                vec![new_key],
                &self.stream.stream_id,
                &publisher_id,
                group_key_id.as_deref(),
            ) {
                error!(
                    stream_id = %self.stream.stream_id,
                    publisher = %publisher_id,
                    error = %e,
                    "Failed to handle rotated group key"
                );
            }
        }
    }

    fn on_new_keys_added(&self, publisher_id: &Address, group_keys: &[GroupKey]) {
        let _processing = self.processing.lock();
        let ids: HashSet<String> = group_keys
            .iter()
            .map(|k| k.group_key_id().to_string())
            .collect();
        for id in &ids {
            self.key_requests.resolve(id);
        }

        let unlocked = self.queues.lock().drain_unlocked_messages(publisher_id, &ids);
        trace!(
            stream_id = %self.stream.stream_id,
            publisher = %publisher_id,
            keys = ids.len(),
            unlocked = unlocked.len(),
            "Received group keys"
        );
        for msg in unlocked {
            self.decrypt_and_handle(msg);
        }
    }
}
