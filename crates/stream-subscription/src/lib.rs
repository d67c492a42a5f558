//! # Stream Subscription
//!
//! Client-side delivery core for a publish/subscribe stream network.
//!
//! **Architecture:** Hexagonal (Ports/Adapters)
//!
//! ## Purpose
//!
//! Turn the raw, possibly out-of-order and possibly encrypted messages a
//! client receives for one stream partition into a per-chain, in-order,
//! decrypted feed for the consumer:
//! - Per-chain ordering with gap detection and a pluggable gap policy
//! - Group-key requests with bounded retries while messages wait for a key
//! - One retry cycle per key before a decrypt failure is reported
//! - Publisher signature verification with cached stream metadata
//!
//! ## Failure Handling
//!
//! | Condition | Outcome |
//! |-----------|---------|
//! | Gap outlives the propagation timeout | Gap handler invoked, up to `max_gap_requests` times |
//! | Chain buffer full | Gap skipped when `skip_gaps_on_full_queue` is set |
//! | First decrypt failure for a key | Message queued, key requested |
//! | Second decrypt failure for a key | `on_unable_to_decrypt` |
//! | Key requests exhausted | Logged; message stays queued |
//! | Invalid signature | `SubscriptionError::InvalidSignature` |
//!
//! ## Module Structure
//!
//! ```text
//! stream-subscription/
//! ├── domain/          # Chains, decryption queues, TTL cache, signing, errors
//! ├── ports/           # Subscription API (inbound) + collaborator traits (outbound)
//! ├── application/     # Scheduler, orderer, key requests, verification, BasicSubscription
//! ├── adapters/        # AES-GCM, in-memory key store, key exchange, wire requests
//! └── config.rs        # SubscriptionConfig, VerificationConfig
//! ```

#![warn(clippy::all)]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use adapters::{
    AesGcmDecryptor, InMemoryGroupKeyStore, ResendGapHandler, StoreKeyExchange,
    WireGroupKeyRequester,
};
pub use application::{
    BasicSubscription, ChainSnapshot, DecryptionKeySequence, GroupKeyRequestMachine,
    KeyRequestState, OrderingUtil, SubscribedStreams, SubscriptionPorts, TaskScheduler,
    TaskToken, WeakSubscription,
};
pub use config::{SignatureVerificationPolicy, SubscriptionConfig, VerificationConfig};
pub use domain::{Admission, ChainKey, DecryptionQueues, Gap, OrderedMsgChain, SubscriptionError, UnableToDecrypt};
pub use ports::{
    FailOnGap, GapHandler, GroupKeyRequester, GroupKeyStore, KeyExchange, MessageDecryptor,
    MessageHandler, StreamMetadataSource, Subscription,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
