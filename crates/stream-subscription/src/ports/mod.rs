//! # Ports Module
//!
//! Inbound API and outbound dependency traits.

pub mod inbound;
pub mod outbound;

pub use inbound::Subscription;
pub use outbound::{
    FailOnGap, GapHandler, GroupKeyRequester, GroupKeyStore, KeyExchange, MessageDecryptor,
    MessageHandler, StreamMetadataSource,
};
