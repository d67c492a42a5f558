//! # Shared Types Crate
//!
//! This crate contains the message model used by the subscription engine and
//! the positional wire codec that the transport layer relies on.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: `MessageRef`, `MessageId` and `StreamMessage`
//!   are defined once here and shared by every crate in the workspace.
//! - **Immutable Messages**: a `StreamMessage` is built once; the only mutation
//!   is replacing ciphertext with plaintext after a successful decrypt.
//! - **Opaque Wire Values**: ids and control requests travel as structured JSON
//!   arrays, never as hand-assembled byte strings.

pub mod entities;
pub mod errors;
pub mod wire;

pub use entities::*;
pub use errors::*;
pub use wire::{GroupKeyRequest, ResendFromRequest};
