//! # Test Fixtures
//!
//! Recording implementations of the subscription's outbound ports and
//! builders for chained messages.

use std::sync::Arc;

use parking_lot::Mutex;
use shared_types::{Address, GroupKey, MessageId, MessageRef, StreamMessage, StreamPartition};
use stream_subscription::adapters::{encrypt_content, AesGcmDecryptor, InMemoryGroupKeyStore};
use stream_subscription::{
    BasicSubscription, Gap, GroupKeyRequester, KeyExchange, MessageHandler, SubscriptionConfig,
    SubscriptionError, SubscriptionPorts, UnableToDecrypt,
};

pub const STREAM_ID: &str = "stream-1";

pub fn publisher() -> Address {
    Address::from_bytes([0xAA; 20])
}

pub fn stream() -> StreamPartition {
    StreamPartition::new(STREAM_ID, 0)
}

/// Content message at `(ts, 0)` on `chain`, linked to `(prev, 0)`.
pub fn message_on(chain: &str, ts: i64, prev: Option<i64>) -> StreamMessage {
    let id = MessageId::new(STREAM_ID, 0, ts, 0, publisher(), chain);
    let msg = StreamMessage::new(id, format!(r#"{{"n":{ts}}}"#));
    match prev {
        Some(p) => msg.with_prev_msg_ref(MessageRef::new(p, 0)),
        None => msg,
    }
}

pub fn message(ts: i64, prev: Option<i64>) -> StreamMessage {
    message_on("chain-a", ts, prev)
}

/// Same as [`message`] with content encrypted under `key`.
pub fn encrypted(ts: i64, prev: Option<i64>, key: &GroupKey) -> StreamMessage {
    let id = MessageId::new(STREAM_ID, 0, ts, 0, publisher(), "chain-a");
    let content = encrypt_content(&format!(r#"{{"n":{ts}}}"#), key).expect("encrypt");
    let msg = StreamMessage::new(id, content).with_encryption(key.group_key_id());
    match prev {
        Some(p) => msg.with_prev_msg_ref(MessageRef::new(p, 0)),
        None => msg,
    }
}

/// Consumer that keeps everything it is handed.
#[derive(Default)]
pub struct RecordingHandler {
    pub delivered: Mutex<Vec<StreamMessage>>,
    pub failures: Mutex<Vec<UnableToDecrypt>>,
}

impl RecordingHandler {
    pub fn timestamps(&self) -> Vec<i64> {
        self.delivered
            .lock()
            .iter()
            .map(|m| m.message_ref().timestamp)
            .collect()
    }
}

impl MessageHandler for RecordingHandler {
    fn on_message(&self, _subscription: &StreamPartition, msg: StreamMessage) {
        self.delivered.lock().push(msg);
    }

    fn on_unable_to_decrypt(&self, error: UnableToDecrypt) {
        self.failures.lock().push(error);
    }
}

/// Key requester that records `(publisher, key ids)` per call.
#[derive(Default)]
pub struct RecordingRequester {
    pub requests: Mutex<Vec<(Address, Vec<String>)>>,
}

impl RecordingRequester {
    pub fn count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl GroupKeyRequester for RecordingRequester {
    fn request_group_keys(&self, publisher_id: &Address, group_key_ids: Vec<String>) {
        self.requests
            .lock()
            .push((publisher_id.clone(), group_key_ids));
    }
}

/// Key exchange that accepts and ignores rotated keys.
pub struct NoopKeyExchange;

impl KeyExchange for NoopKeyExchange {
    fn handle_new_encrypted_keys(
        &self,
        _keys: Vec<shared_types::EncryptedGroupKey>,
        _stream_id: &str,
        _publisher_id: &Address,
        _group_key_id: Option<&str>,
    ) -> Result<(), SubscriptionError> {
        Ok(())
    }
}

/// Gap handler that records every report and succeeds.
#[derive(Default)]
pub struct RecordingGapHandler {
    pub gaps: Mutex<Vec<Gap>>,
}

impl stream_subscription::GapHandler for RecordingGapHandler {
    fn handle_gap(&self, gap: &Gap) -> Result<(), SubscriptionError> {
        self.gaps.lock().push(gap.clone());
        Ok(())
    }
}

/// A subscription wired to recording ports.
pub struct Fixture {
    pub subscription: BasicSubscription,
    pub handler: Arc<RecordingHandler>,
    pub requester: Arc<RecordingRequester>,
    pub store: Arc<InMemoryGroupKeyStore>,
}

impl Fixture {
    /// Must be called inside a tokio runtime.
    pub fn new(config: SubscriptionConfig) -> Self {
        Self::with_exchange(config, Arc::new(NoopKeyExchange), Arc::new(InMemoryGroupKeyStore::new()))
    }

    pub fn with_exchange(
        config: SubscriptionConfig,
        key_exchange: Arc<dyn KeyExchange>,
        store: Arc<InMemoryGroupKeyStore>,
    ) -> Self {
        let handler = Arc::new(RecordingHandler::default());
        let requester = Arc::new(RecordingRequester::default());
        let ports = SubscriptionPorts {
            handler: handler.clone(),
            key_store: store.clone(),
            key_exchange,
            key_requester: Some(requester.clone()),
            decryptor: Arc::new(AesGcmDecryptor),
        };
        let subscription =
            BasicSubscription::new(stream(), config, ports).expect("runtime available");
        Self {
            subscription,
            handler,
            requester,
            store,
        }
    }
}
