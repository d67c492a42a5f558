//! # Application Module
//!
//! Stateful services built on the domain types: the task scheduler, the
//! chain orderer, the group-key retry machine, the historical key sequencer,
//! signature verification and the subscription that ties them together.

pub mod key_requests;
pub mod key_sequence;
pub mod ordering;
pub mod scheduler;
pub mod subscription;
pub mod verification;

pub use key_requests::{GroupKeyRequestMachine, KeyRequestState};
pub use key_sequence::DecryptionKeySequence;
pub use ordering::{ChainSnapshot, InOrderHandler, OrderingUtil};
pub use scheduler::{TaskScheduler, TaskToken};
pub use subscription::{BasicSubscription, SubscriptionPorts, WeakSubscription};
pub use verification::SubscribedStreams;
