//! # Domain Module
//!
//! Pure state machines and value types. Nothing here owns a timer or calls
//! back into a port.

pub mod chain;
pub mod decryption_queues;
pub mod errors;
pub mod signing;
pub mod ttl_cache;

pub use chain::{Admission, ChainKey, Gap, OrderedMsgChain};
pub use decryption_queues::DecryptionQueues;
pub use errors::{SubscriptionError, UnableToDecrypt};
pub use signing::{has_valid_signature, recover_signer, sign_message, signature_payload};
pub use ttl_cache::TtlCache;
