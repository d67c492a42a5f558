//! # Key-Store Backed Key Exchange
//!
//! Unwraps rotated keys embedded in delivered messages with the key the
//! message was encrypted under, stores them, and tells the listener (usually
//! a subscription) which keys became available.

use std::sync::Arc;

use parking_lot::RwLock;
use shared_types::{Address, EncryptedGroupKey, GroupKey};
use tracing::{debug, warn};

use super::aes::decrypt_group_key;
use super::key_store::InMemoryGroupKeyStore;
use crate::domain::SubscriptionError;
use crate::ports::{GroupKeyStore, KeyExchange};

/// Called with the publisher and the keys that were just stored.
pub type KeysAddedListener = Arc<dyn Fn(&Address, &[GroupKey]) + Send + Sync>;

/// Key exchange that keeps keys in an [`InMemoryGroupKeyStore`].
pub struct StoreKeyExchange {
    store: Arc<InMemoryGroupKeyStore>,
    listener: RwLock<Option<KeysAddedListener>>,
}

impl StoreKeyExchange {
    pub fn new(store: Arc<InMemoryGroupKeyStore>) -> Self {
        Self {
            store,
            listener: RwLock::new(None),
        }
    }

    pub fn set_listener(&self, listener: KeysAddedListener) {
        *self.listener.write() = Some(listener);
    }

    /// Stores plaintext keys received from `publisher_id` (for example in a
    /// group-key response) and notifies the listener.
    pub fn add_keys(&self, stream_id: &str, publisher_id: &Address, keys: Vec<GroupKey>) {
        for key in &keys {
            self.store.add(stream_id, key.clone());
        }
        debug!(
            stream_id,
            publisher = %publisher_id,
            count = keys.len(),
            "Stored group keys"
        );
        let listener = self.listener.read().clone();
        match listener {
            Some(listener) => listener(publisher_id, &keys),
            None => warn!(stream_id, "Group keys stored but no listener is set"),
        }
    }
}

impl KeyExchange for StoreKeyExchange {
    fn handle_new_encrypted_keys(
        &self,
        keys: Vec<EncryptedGroupKey>,
        stream_id: &str,
        publisher_id: &Address,
        group_key_id: Option<&str>,
    ) -> Result<(), SubscriptionError> {
        let group_key_id = group_key_id.ok_or_else(|| {
            SubscriptionError::KeyExchange("rotated key arrived in an unencrypted message".into())
        })?;
        let current = self.store.get(stream_id, group_key_id).ok_or_else(|| {
            SubscriptionError::KeyExchange(format!(
                "key {group_key_id} needed to unwrap rotated keys is not stored"
            ))
        })?;

        let unwrapped = keys
            .iter()
            .map(|k| decrypt_group_key(k, &current))
            .collect::<Result<Vec<_>, _>>()?;
        self.add_keys(stream_id, publisher_id, unwrapped);
        Ok(())
    }
}
