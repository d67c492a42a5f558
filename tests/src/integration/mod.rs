//! End-to-end flows through a subscription.

pub mod fixtures;

mod decryption;
mod key_requests;
mod ordering;
mod verification;
