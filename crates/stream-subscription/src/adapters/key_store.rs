//! # In-Memory Group Key Store
//!
//! Keys indexed by `(stream_id, group_key_id)`.

use std::collections::HashMap;

use parking_lot::RwLock;
use shared_types::GroupKey;

use crate::ports::GroupKeyStore;

/// Thread-safe in-memory key store.
#[derive(Debug, Default)]
pub struct InMemoryGroupKeyStore {
    keys: RwLock<HashMap<(String, String), GroupKey>>,
}

impl InMemoryGroupKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `key` for `stream_id`, replacing any key with the same id.
    pub fn add(&self, stream_id: &str, key: GroupKey) {
        self.keys
            .write()
            .insert((stream_id.to_string(), key.group_key_id().to_string()), key);
    }

    pub fn contains(&self, stream_id: &str, group_key_id: &str) -> bool {
        self.keys
            .read()
            .contains_key(&(stream_id.to_string(), group_key_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

impl GroupKeyStore for InMemoryGroupKeyStore {
    fn get(&self, stream_id: &str, group_key_id: &str) -> Option<GroupKey> {
        self.keys
            .read()
            .get(&(stream_id.to_string(), group_key_id.to_string()))
            .cloned()
    }
}
