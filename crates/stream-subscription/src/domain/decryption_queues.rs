//! # Decryption-Blocked Queue
//!
//! Messages that could not be decrypted yet, filed under the publisher and
//! the group key they need. Draining returns them in the order they were
//! queued, across all requested key ids.

use std::collections::{HashMap, HashSet};

use shared_types::{Address, StreamMessage};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct QueueKey {
    publisher_id: Address,
    group_key_id: Option<String>,
}

/// Routing table of messages awaiting a group key.
#[derive(Debug, Default)]
pub struct DecryptionQueues {
    queues: HashMap<QueueKey, Vec<(u64, StreamMessage)>>,
    next_seq: u64,
}

impl DecryptionQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files `msg` under its publisher and group key id.
    pub fn add(&mut self, msg: StreamMessage) {
        let key = QueueKey {
            publisher_id: msg.publisher_id().clone(),
            group_key_id: msg.group_key_id().map(str::to_string),
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queues.entry(key).or_default().push((seq, msg));
    }

    /// Removes every message from `publisher_id` waiting on one of
    /// `group_key_ids`, oldest first.
    pub fn drain_unlocked_messages(
        &mut self,
        publisher_id: &Address,
        group_key_ids: &HashSet<String>,
    ) -> Vec<StreamMessage> {
        let mut unlocked: Vec<(u64, StreamMessage)> = Vec::new();
        for group_key_id in group_key_ids {
            let key = QueueKey {
                publisher_id: publisher_id.clone(),
                group_key_id: Some(group_key_id.clone()),
            };
            if let Some(entries) = self.queues.remove(&key) {
                unlocked.extend(entries);
            }
        }
        unlocked.sort_by_key(|(seq, _)| *seq);
        unlocked.into_iter().map(|(_, msg)| msg).collect()
    }

    /// Number of messages queued for `publisher_id` under `group_key_id`.
    pub fn queued_for(&self, publisher_id: &Address, group_key_id: &str) -> usize {
        let key = QueueKey {
            publisher_id: publisher_id.clone(),
            group_key_id: Some(group_key_id.to_string()),
        };
        self.queues.get(&key).map_or(0, Vec::len)
    }

    pub fn len(&self) -> usize {
        self.queues.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.values().all(Vec::is_empty)
    }
}
