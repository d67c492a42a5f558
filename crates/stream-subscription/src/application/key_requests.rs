//! # Group-Key Request Retry Machine
//!
//! One retry timer per missing group key.
//!
//! ```text
//! absent ──start──▶ pending(1) ──tick──▶ pending(2) ... pending(max) ──tick──▶ exhausted
//!                      │                                   │
//!                      └──────────── resolve ──────────────┴──▶ absent
//! ```
//!
//! `start` sends the first request immediately; the timer then sends one
//! more every `propagation_timeout` until `max_group_key_requests` have gone
//! out. The tick after the last request cancels the timer and leaves the
//! key exhausted: no further requests, queued messages stay queued.
//! Only the latest [`MAX_EXHAUSTED_KEYS`] exhausted ids are remembered;
//! older ones read as `Absent` again.
//!
//! Ticks, `start` and `resolve` all run under one reentrant lock shared with
//! the owning subscription, so a tick can never send a request for a key
//! that has just been resolved, and a requester that answers synchronously
//! may call back into `resolve`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use shared_types::Address;
use stream_telemetry::{GROUP_KEY_REQUESTS, GROUP_KEY_REQUESTS_EXHAUSTED};
use tracing::{info, trace, warn};

use super::scheduler::{TaskScheduler, TaskToken};
use crate::ports::GroupKeyRequester;

/// Exhausted key ids remembered per stream.
pub const MAX_EXHAUSTED_KEYS: usize = 1_000;

/// Where a group key stands in the retry machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyRequestState {
    /// No request outstanding.
    Absent,
    /// Requests in flight; `attempts` sent so far.
    Pending { attempts: u32 },
    /// Attempts used up without an answer.
    Exhausted,
}

#[derive(Debug)]
struct PendingKeyRequest {
    publisher_id: Address,
    attempts: u32,
    token: TaskToken,
}

#[derive(Debug, Default)]
struct MachineState {
    pending: HashMap<String, PendingKeyRequest>,
    exhausted: HashSet<String>,
    // Insertion order of `exhausted`, oldest first
    exhausted_order: VecDeque<String>,
}

impl MachineState {
    fn mark_exhausted(&mut self, group_key_id: &str) {
        if !self.exhausted.insert(group_key_id.to_string()) {
            return;
        }
        self.exhausted_order.push_back(group_key_id.to_string());
        while self.exhausted_order.len() > MAX_EXHAUSTED_KEYS {
            if let Some(oldest) = self.exhausted_order.pop_front() {
                self.exhausted.remove(&oldest);
            }
        }
    }

    fn clear_exhausted(&mut self, group_key_id: &str) {
        if self.exhausted.remove(group_key_id) {
            self.exhausted_order.retain(|id| id != group_key_id);
        }
    }
}

struct MachineInner {
    stream_id: String,
    scheduler: Arc<TaskScheduler>,
    requester: Arc<dyn GroupKeyRequester>,
    interval: Duration,
    max_attempts: u32,
    serial: Arc<ReentrantMutex<()>>,
    state: Mutex<MachineState>,
    this: Weak<MachineInner>,
}

/// Retry timers for the group keys of one stream.
pub struct GroupKeyRequestMachine {
    inner: Arc<MachineInner>,
}

impl GroupKeyRequestMachine {
    /// `serial` is the lock the owner holds while mutating state that
    /// depends on pending requests.
    pub fn new(
        stream_id: impl Into<String>,
        scheduler: Arc<TaskScheduler>,
        requester: Arc<dyn GroupKeyRequester>,
        interval: Duration,
        max_attempts: u32,
        serial: Arc<ReentrantMutex<()>>,
    ) -> Self {
        let inner = Arc::new_cyclic(|this| MachineInner {
            stream_id: stream_id.into(),
            scheduler,
            requester,
            interval,
            max_attempts,
            serial,
            state: Mutex::new(MachineState::default()),
            this: this.clone(),
        });
        Self { inner }
    }

    /// Starts requesting `group_key_id` from `publisher_id`.
    ///
    /// Returns `false` if a request for that key is already pending.
    pub fn start(&self, publisher_id: &Address, group_key_id: &str) -> bool {
        let inner = &self.inner;
        let _serial = inner.serial.lock();
        {
            let mut state = inner.state.lock();
            if state.pending.contains_key(group_key_id) {
                return false;
            }
            state.clear_exhausted(group_key_id);

            let this = inner.this.clone();
            let key_id = group_key_id.to_string();
            let token = inner
                .scheduler
                .schedule_periodic(inner.interval, inner.interval, move |token| {
                    if let Some(machine) = this.upgrade() {
                        machine.on_tick(&key_id, token);
                    }
                });
            state.pending.insert(
                group_key_id.to_string(),
                PendingKeyRequest {
                    publisher_id: publisher_id.clone(),
                    attempts: 0,
                    token,
                },
            );
        }
        inner.attempt(group_key_id, None);
        true
    }

    /// A key arrived: stop requesting it.
    ///
    /// Returns `true` if a request was pending.
    pub fn resolve(&self, group_key_id: &str) -> bool {
        let inner = &self.inner;
        let _serial = inner.serial.lock();
        let mut state = inner.state.lock();
        state.clear_exhausted(group_key_id);
        match state.pending.remove(group_key_id) {
            Some(request) => {
                inner.scheduler.cancel(request.token);
                trace!(
                    stream_id = %inner.stream_id,
                    group_key_id,
                    attempts = request.attempts,
                    "Pending group key request canceled"
                );
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, group_key_id: &str) -> bool {
        self.inner.state.lock().pending.contains_key(group_key_id)
    }

    pub fn state(&self, group_key_id: &str) -> KeyRequestState {
        let state = self.inner.state.lock();
        if let Some(request) = state.pending.get(group_key_id) {
            return KeyRequestState::Pending {
                attempts: request.attempts,
            };
        }
        if state.exhausted.contains(group_key_id) {
            KeyRequestState::Exhausted
        } else {
            KeyRequestState::Absent
        }
    }

    /// Number of keys with requests in flight.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn exhausted_count(&self) -> usize {
        self.inner.state.lock().exhausted.len()
    }
}

impl MachineInner {
    fn on_tick(&self, group_key_id: &str, token: TaskToken) {
        let _serial = self.serial.lock();
        self.attempt(group_key_id, Some(token));
    }

    /// Sends the next request, or exhausts the key. Caller holds `serial`.
    fn attempt(&self, group_key_id: &str, tick: Option<TaskToken>) {
        let next = {
            let mut state = self.state.lock();
            let Some(request) = state.pending.get_mut(group_key_id) else {
                return;
            };
            if tick.is_some_and(|token| token != request.token) {
                return;
            }
            if request.attempts < self.max_attempts {
                request.attempts += 1;
                Some((request.publisher_id.clone(), request.attempts))
            } else {
                let publisher_id = request.publisher_id.clone();
                let token = request.token;
                state.pending.remove(group_key_id);
                state.mark_exhausted(group_key_id);
                self.scheduler.cancel(token);
                GROUP_KEY_REQUESTS_EXHAUSTED.inc();
                warn!(
                    stream_id = %self.stream_id,
                    publisher = %publisher_id,
                    group_key_id,
                    attempts = self.max_attempts,
                    "Failed to receive group key after max attempts"
                );
                None
            }
        };

        if let Some((publisher_id, attempt)) = next {
            self.requester
                .request_group_keys(&publisher_id, vec![group_key_id.to_string()]);
            GROUP_KEY_REQUESTS.inc();
            info!(
                stream_id = %self.stream_id,
                publisher = %publisher_id,
                group_key_id,
                attempt,
                "Sent group key request"
            );
        }
    }
}

impl Drop for MachineInner {
    fn drop(&mut self) {
        for (_, request) in self.state.get_mut().pending.drain() {
            self.scheduler.cancel(request.token);
        }
    }
}
