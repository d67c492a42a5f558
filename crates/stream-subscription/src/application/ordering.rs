//! # Chain Orderer
//!
//! Routes messages of one stream partition into per-chain sequencers,
//! hands deliverable messages to the in-order callback, and runs a gap timer
//! for every chain whose buffer head is blocked.
//!
//! ## Gap Timer
//!
//! ```text
//! gap opens ──propagation_timeout──▶ report #1 ──resend_timeout──▶ report #2 ... #max
//!     │                                                                        │
//!     └── gap closes / clear_gaps / handler error ──▶ cancelled ◀── GapFillFailed
//! ```
//!
//! ## Locking
//!
//! `delivery` (reentrant) serialises `add` so callbacks fire in chain order
//! even when the callback feeds the orderer again. `state` is never held
//! while a callback or the gap handler runs.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use shared_types::{MessageRef, StreamMessage, StreamPartition};
use stream_telemetry::{GAPS_DETECTED, GAPS_SKIPPED};
use tracing::{debug, error, trace, warn};

use super::scheduler::{TaskScheduler, TaskToken};
use crate::config::SubscriptionConfig;
use crate::domain::{Admission, ChainKey, Gap, OrderedMsgChain, SubscriptionError};
use crate::ports::GapHandler;

/// Callback receiving messages in chain order.
pub type InOrderHandler = Arc<dyn Fn(StreamMessage) + Send + Sync>;

/// Point-in-time view of one chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainSnapshot {
    pub key: ChainKey,
    pub last_received: Option<MessageRef>,
    pub queued: usize,
    pub gap: Option<Gap>,
    pub gap_timer_active: bool,
}

#[derive(Debug)]
struct GapTimer {
    token: TaskToken,
    reports: u32,
}

struct ChainSlot {
    chain: OrderedMsgChain,
    gap_timer: Option<GapTimer>,
}

struct OrderingInner {
    stream: StreamPartition,
    config: SubscriptionConfig,
    scheduler: Arc<TaskScheduler>,
    in_order: InOrderHandler,
    gap_handler: RwLock<Arc<dyn GapHandler>>,
    chains: Mutex<HashMap<ChainKey, ChainSlot>>,
    delivery: ReentrantMutex<()>,
    this: Weak<OrderingInner>,
}

/// Per-partition chain orderer.
pub struct OrderingUtil {
    inner: Arc<OrderingInner>,
}

impl OrderingUtil {
    pub fn new(
        stream: StreamPartition,
        config: SubscriptionConfig,
        scheduler: Arc<TaskScheduler>,
        in_order: InOrderHandler,
        gap_handler: Arc<dyn GapHandler>,
    ) -> Self {
        let inner = Arc::new_cyclic(|this| OrderingInner {
            stream,
            config,
            scheduler,
            in_order,
            gap_handler: RwLock::new(gap_handler),
            chains: Mutex::new(HashMap::new()),
            delivery: ReentrantMutex::new(()),
            this: this.clone(),
        });
        Self { inner }
    }

    /// Accepts `msg` into its chain and delivers whatever became deliverable.
    pub fn add(&self, msg: StreamMessage) {
        self.inner.add(msg);
    }

    /// Cancels every gap timer. Buffered messages stay.
    pub fn clear_gaps(&self) {
        let mut chains = self.inner.chains.lock();
        for slot in chains.values_mut() {
            if let Some(timer) = slot.gap_timer.take() {
                self.inner.scheduler.cancel(timer.token);
            }
        }
    }

    /// Replaces the gap policy. Chains and running gap timers are kept.
    pub fn set_gap_handler(&self, handler: Arc<dyn GapHandler>) {
        *self.inner.gap_handler.write() = handler;
    }

    pub fn gap_handler(&self) -> Arc<dyn GapHandler> {
        self.inner.gap_handler.read().clone()
    }

    /// Snapshot of every chain seen so far.
    pub fn chains(&self) -> Vec<ChainSnapshot> {
        let chains = self.inner.chains.lock();
        let mut snapshots: Vec<ChainSnapshot> = chains
            .values()
            .map(|slot| ChainSnapshot {
                key: slot.chain.key().clone(),
                last_received: slot.chain.last_received(),
                queued: slot.chain.queue_len(),
                gap: slot.chain.gap(),
                gap_timer_active: slot.gap_timer.is_some(),
            })
            .collect();
        snapshots.sort_by(|a, b| a.key.cmp(&b.key));
        snapshots
    }
}

impl OrderingInner {
    fn add(&self, msg: StreamMessage) {
        let _delivery = self.delivery.lock();
        let key = ChainKey::of(&msg);
        let msg_ref = msg.message_ref();
        {
            let mut chains = self.chains.lock();
            let slot = chains.entry(key.clone()).or_insert_with(|| ChainSlot {
                chain: OrderedMsgChain::new(
                    self.stream.clone(),
                    key.clone(),
                    self.config.max_queue_size,
                    self.config.skip_gaps_on_full_queue,
                ),
                gap_timer: None,
            });
            match slot.chain.accept(msg) {
                Admission::Queued => {}
                Admission::Duplicate => {
                    trace!(
                        stream = %self.stream,
                        publisher = %key.publisher_id,
                        msg_chain_id = %key.msg_chain_id,
                        msg_ref = %msg_ref,
                        "Dropping already received message"
                    );
                    return;
                }
                Admission::Full => {
                    warn!(
                        stream = %self.stream,
                        publisher = %key.publisher_id,
                        msg_chain_id = %key.msg_chain_id,
                        msg_ref = %msg_ref,
                        max_queue_size = self.config.max_queue_size,
                        "Out-of-order buffer full, dropping message"
                    );
                    return;
                }
            }
        }
        self.deliver_ready(&key);
    }

    fn deliver_ready(&self, key: &ChainKey) {
        loop {
            let next = {
                let mut chains = self.chains.lock();
                let Some(slot) = chains.get_mut(key) else {
                    return;
                };
                match slot.chain.pop_next() {
                    Some(msg) => Some(msg),
                    None if self.config.skip_gaps_on_full_queue && slot.chain.is_full() => {
                        let gap = slot.chain.gap();
                        let msg = slot.chain.skip_gap();
                        GAPS_SKIPPED.inc();
                        warn!(
                            stream = %self.stream,
                            publisher = %key.publisher_id,
                            msg_chain_id = %key.msg_chain_id,
                            gap = ?gap.map(|g| (g.from.to_string(), g.to.to_string())),
                            max_queue_size = self.config.max_queue_size,
                            "Out-of-order buffer full, skipping gap"
                        );
                        msg
                    }
                    None => None,
                }
            };
            match next {
                Some(msg) => (self.in_order)(msg),
                None => break,
            }
        }
        self.sync_gap_timer(key);
    }

    /// Arms the gap timer when the chain head is blocked, cancels it when not.
    fn sync_gap_timer(&self, key: &ChainKey) {
        let mut chains = self.chains.lock();
        let Some(slot) = chains.get_mut(key) else {
            return;
        };
        match (slot.chain.gap(), slot.gap_timer.is_some()) {
            (Some(gap), false) => {
                GAPS_DETECTED.inc();
                debug!(
                    stream = %self.stream,
                    publisher = %key.publisher_id,
                    msg_chain_id = %key.msg_chain_id,
                    from = %gap.from,
                    to = %gap.to,
                    "Gap detected, scheduling gap check"
                );
                let this = self.this.clone();
                let timer_key = key.clone();
                let token = self.scheduler.schedule_periodic(
                    self.config.propagation_timeout(),
                    self.config.resend_timeout(),
                    move |token| {
                        if let Some(inner) = this.upgrade() {
                            inner.on_gap_tick(&timer_key, token);
                        }
                    },
                );
                slot.gap_timer = Some(GapTimer { token, reports: 0 });
            }
            (None, true) => {
                if let Some(timer) = slot.gap_timer.take() {
                    self.scheduler.cancel(timer.token);
                    trace!(
                        stream = %self.stream,
                        publisher = %key.publisher_id,
                        msg_chain_id = %key.msg_chain_id,
                        "Gap closed"
                    );
                }
            }
            _ => {}
        }
    }

    fn on_gap_tick(&self, key: &ChainKey, token: TaskToken) {
        let gap = {
            let mut chains = self.chains.lock();
            let Some(slot) = chains.get_mut(key) else {
                self.scheduler.cancel(token);
                return;
            };
            let Some(reports) = slot
                .gap_timer
                .as_ref()
                .filter(|t| t.token == token)
                .map(|t| t.reports)
            else {
                // Superseded or cancelled while this tick was in flight
                return;
            };
            let Some(gap) = slot.chain.gap() else {
                slot.gap_timer = None;
                self.scheduler.cancel(token);
                return;
            };
            if reports >= self.config.max_gap_requests {
                let failure = SubscriptionError::GapFillFailed {
                    gap,
                    attempts: reports,
                };
                slot.gap_timer = None;
                self.scheduler.cancel(token);
                warn!(stream = %self.stream, error = %failure, "Giving up on gap");
                return;
            }
            if let Some(timer) = slot.gap_timer.as_mut() {
                timer.reports += 1;
            }
            gap
        };

        let handler = self.gap_handler.read().clone();
        if let Err(e) = handler.handle_gap(&gap) {
            error!(
                stream = %self.stream,
                publisher = %gap.publisher_id,
                msg_chain_id = %gap.msg_chain_id,
                error = %e,
                "Gap handler failed"
            );
            let mut chains = self.chains.lock();
            if let Some(slot) = chains.get_mut(key) {
                if slot.gap_timer.as_ref().is_some_and(|t| t.token == token) {
                    slot.gap_timer = None;
                }
            }
            self.scheduler.cancel(token);
        }
    }
}

impl Drop for OrderingInner {
    fn drop(&mut self) {
        for slot in self.chains.get_mut().values_mut() {
            if let Some(timer) = slot.gap_timer.take() {
                self.scheduler.cancel(timer.token);
            }
        }
    }
}
