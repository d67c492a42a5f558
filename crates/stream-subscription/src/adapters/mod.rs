//! # Adapters Module
//!
//! Concrete implementations of the outbound ports.

pub mod aes;
pub mod control;
pub mod key_exchange;
pub mod key_store;

pub use aes::{decrypt_content, decrypt_group_key, encrypt_content, encrypt_group_key, AesGcmDecryptor};
pub use control::{ControlSink, KeyRequestSink, ResendGapHandler, WireGroupKeyRequester};
pub use key_exchange::{KeysAddedListener, StoreKeyExchange};
pub use key_store::InMemoryGroupKeyStore;
