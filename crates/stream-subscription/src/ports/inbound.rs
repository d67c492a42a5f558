//! # Inbound Ports
//!
//! API a subscription exposes to the transport and the key exchange.

use shared_types::{Address, GroupKey, StreamMessage, StreamPartition};

/// Subscription API - inbound port.
pub trait Subscription: Send + Sync {
    /// Partition this subscription is bound to.
    fn stream_partition(&self) -> &StreamPartition;

    /// A message received live from the network.
    fn handle_real_time_message(&self, msg: StreamMessage);

    /// A message received as part of a resend.
    fn handle_resent_message(&self, msg: StreamMessage);

    /// `group_keys` from `publisher_id` are now in the key store.
    fn on_new_keys_added(&self, publisher_id: &Address, group_keys: &[GroupKey]);

    /// Stops all pending gap timers. Buffered messages are kept.
    fn clear(&self);
}
