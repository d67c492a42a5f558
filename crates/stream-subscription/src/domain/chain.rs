//! # Ordered Message Chain
//!
//! Sequencer for the messages of one (publisher, message-chain) pair.
//!
//! A message is *next* when the chain has delivered nothing yet, when it
//! carries no previous reference, or when its previous reference equals the
//! last delivered ref. Anything else waits in a buffer sorted by
//! `MessageRef` until the missing link shows up or the gap is skipped.
//!
//! The chain holds no timers and invokes no callbacks; the caller pops
//! deliverable messages one at a time and decides what a gap means.
//!
//! When gaps are not skipped, a buffer at `max_queue_size` only admits the
//! message that is next, so the buffer never exceeds its capacity.

use std::collections::BTreeMap;
use std::fmt;

use shared_types::{Address, MessageRef, StreamMessage, StreamPartition};

/// Identity of a chain inside one stream partition.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainKey {
    pub publisher_id: Address,
    pub msg_chain_id: String,
}

impl ChainKey {
    pub fn new(publisher_id: Address, msg_chain_id: impl Into<String>) -> Self {
        Self {
            publisher_id,
            msg_chain_id: msg_chain_id.into(),
        }
    }

    /// Key of the chain `msg` belongs to.
    pub fn of(msg: &StreamMessage) -> Self {
        Self::new(msg.publisher_id().clone(), msg.msg_chain_id())
    }
}

/// A run of missing messages, `from..=to` inclusive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gap {
    pub stream_id: String,
    pub partition: u32,
    /// First missing ref: successor of the last delivered ref.
    pub from: MessageRef,
    /// Last missing ref: previous ref of the lowest buffered message.
    pub to: MessageRef,
    pub publisher_id: Address,
    pub msg_chain_id: String,
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} publisher {} chain {} from {} to {}",
            self.stream_id,
            self.partition,
            self.publisher_id,
            self.msg_chain_id,
            self.from,
            self.to
        )
    }
}

/// Outcome of [`OrderedMsgChain::accept`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Buffered; may be deliverable right away.
    Queued,
    /// Already received or already buffered.
    Duplicate,
    /// Buffer at capacity and the message does not close the gap.
    Full,
}

/// Per-chain sequencer with a bounded out-of-order buffer.
#[derive(Debug)]
pub struct OrderedMsgChain {
    stream: StreamPartition,
    key: ChainKey,
    last_received: Option<MessageRef>,
    queue: BTreeMap<MessageRef, StreamMessage>,
    max_queue_size: usize,
    skip_gaps_on_full_queue: bool,
}

impl OrderedMsgChain {
    pub fn new(
        stream: StreamPartition,
        key: ChainKey,
        max_queue_size: usize,
        skip_gaps_on_full_queue: bool,
    ) -> Self {
        Self {
            stream,
            key,
            last_received: None,
            queue: BTreeMap::new(),
            max_queue_size,
            skip_gaps_on_full_queue,
        }
    }

    pub fn key(&self) -> &ChainKey {
        &self.key
    }

    /// Ref of the last message handed out by [`pop_next`](Self::pop_next)
    /// or [`skip_gap`](Self::skip_gap).
    pub fn last_received(&self) -> Option<MessageRef> {
        self.last_received
    }

    /// Ref the chain expects next, if anything has been delivered.
    pub fn expected_next(&self) -> Option<MessageRef> {
        self.last_received.map(|r| r.successor())
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Buffer holds more than `max_queue_size` messages.
    pub fn is_full(&self) -> bool {
        self.queue.len() > self.max_queue_size
    }

    /// Buffers `msg` unless it is a duplicate, a stale ref, or would grow a
    /// non-skipping buffer past capacity.
    pub fn accept(&mut self, msg: StreamMessage) -> Admission {
        let msg_ref = msg.message_ref();
        if self.last_received.is_some_and(|last| msg_ref <= last) {
            return Admission::Duplicate;
        }
        if self.queue.contains_key(&msg_ref) {
            return Admission::Duplicate;
        }
        if !self.skip_gaps_on_full_queue
            && self.queue.len() >= self.max_queue_size
            && !self.is_next(&msg)
        {
            return Admission::Full;
        }
        self.queue.insert(msg_ref, msg);
        Admission::Queued
    }

    /// Removes and returns the lowest buffered message if it is next.
    pub fn pop_next(&mut self) -> Option<StreamMessage> {
        let (_, head) = self.queue.first_key_value()?;
        if !self.is_next(head) {
            return None;
        }
        self.pop_lowest()
    }

    /// Removes and returns the lowest buffered message unconditionally,
    /// jumping over whatever is missing before it.
    pub fn skip_gap(&mut self) -> Option<StreamMessage> {
        self.pop_lowest()
    }

    /// The gap blocking the head of the buffer, if any.
    pub fn gap(&self) -> Option<Gap> {
        let (_, head) = self.queue.first_key_value()?;
        let (Some(last), Some(prev)) = (self.last_received, head.prev_msg_ref()) else {
            return None;
        };
        if prev == last {
            return None;
        }
        Some(Gap {
            stream_id: self.stream.stream_id.clone(),
            partition: self.stream.partition,
            from: last.successor(),
            to: prev,
            publisher_id: self.key.publisher_id.clone(),
            msg_chain_id: self.key.msg_chain_id.clone(),
        })
    }

    fn is_next(&self, msg: &StreamMessage) -> bool {
        match (self.last_received, msg.prev_msg_ref()) {
            (None, _) | (_, None) => true,
            (Some(last), Some(prev)) => prev == last,
        }
    }

    fn pop_lowest(&mut self) -> Option<StreamMessage> {
        let (msg_ref, msg) = self.queue.pop_first()?;
        self.last_received = Some(msg_ref);
        Some(msg)
    }
}
