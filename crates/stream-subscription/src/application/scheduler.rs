//! # Task Scheduler
//!
//! Periodic timers as lightweight tokio tasks, addressed by [`TaskToken`].
//!
//! `cancel` aborts the task, but a tick that is already running finishes its
//! body. Task bodies therefore look their token up under the owning
//! component's lock and do nothing when it is no longer registered there.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::domain::SubscriptionError;

/// Handle to a scheduled task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskToken(u64);

impl fmt::Display for TaskToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Scheduled-task executor backed by a tokio runtime.
pub struct TaskScheduler {
    runtime: Handle,
    tasks: Mutex<HashMap<TaskToken, JoinHandle<()>>>,
    next_token: AtomicU64,
}

impl TaskScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            tasks: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    /// Scheduler on the runtime the caller is running in.
    pub fn try_current() -> Result<Self, SubscriptionError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| SubscriptionError::Scheduler(e.to_string()))
    }

    /// Runs `task` after `initial_delay` and then every `period` until
    /// cancelled. The task receives its own token.
    pub fn schedule_periodic<F>(&self, initial_delay: Duration, period: Duration, task: F) -> TaskToken
    where
        F: Fn(TaskToken) + Send + Sync + 'static,
    {
        let token = TaskToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        // interval_at panics on a zero period
        let period = period.max(Duration::from_millis(1));

        // Held across spawn so a cancel for this token cannot run first
        let mut tasks = self.tasks.lock();
        let handle = self.runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + initial_delay, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                task(token);
            }
        });
        tasks.insert(token, handle);
        token
    }

    /// Stops `token`. Returns `false` if it was not scheduled.
    pub fn cancel(&self, token: TaskToken) -> bool {
        match self.tasks.lock().remove(&token) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, token: TaskToken) -> bool {
        self.tasks.lock().contains_key(&token)
    }

    /// Number of live tasks.
    pub fn active_tasks(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("active_tasks", &self.active_tasks())
            .finish_non_exhaustive()
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.get_mut().drain() {
            handle.abort();
        }
    }
}
