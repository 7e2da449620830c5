//! # Key Queue
//!
//! Deduplicating, rate-limited work queue of [`WorkKey`]s.
//!
//! The queue is a monitor: every operation takes the same internal lock, so
//! `add`, `take`, `done` and `requeue_after` are atomic with respect to each
//! other. It guarantees that a key is handed to at most one worker at a time.
//!
//! ## Key states
//!
//! - **pending**: waiting in FIFO order for a worker
//! - **in flight**: taken by a worker and not yet marked done
//! - **parked**: re-added while in flight; becomes pending on `done`
//!
//! Failed keys are re-added by a per-key timer after an exponential backoff
//! delay. Once a key has failed more than `max_retries` times it is dropped and
//! handed to the [`FailureReporter`]. Failed keys that can no longer be retried
//! because the queue shut down are reported as abandoned.

use crate::controller::backoff::ExponentialBackoff;
use crate::controller::key::WorkKey;
use crate::observability::metrics;
use crate::runtime::error_policy::FailureReporter;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Outcome of handing a failed key back to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// The key will be re-added after `delay`
    Scheduled { attempt: u32, delay: Duration },
    /// The key exceeded its retry budget and was reported
    Dropped { attempts: u32 },
    /// The queue is shutting down and no longer schedules retries
    ShuttingDown,
}

enum Insert {
    Pending,
    Parked,
    Duplicate,
    Rejected(WorkKey),
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<WorkKey>,
    /// Keys waiting for a worker, including parked ones
    dirty: HashSet<WorkKey>,
    in_flight: HashSet<WorkKey>,
    failures: HashMap<WorkKey, u32>,
    shutting_down: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    available: Notify,
    backoff: ExponentialBackoff,
    max_retries: u32,
    reporter: Arc<dyn FailureReporter>,
}

/// Handle to the shared work queue
///
/// Cloning is cheap; all clones refer to the same queue.
#[derive(Clone)]
pub struct KeyQueue {
    shared: Arc<Shared>,
}

impl fmt::Debug for KeyQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("KeyQueue")
            .field("pending", &state.pending.len())
            .field("in_flight", &state.in_flight.len())
            .field("shutting_down", &state.shutting_down)
            .field("max_retries", &self.shared.max_retries)
            .finish_non_exhaustive()
    }
}

impl KeyQueue {
    pub fn new(
        backoff: ExponentialBackoff,
        max_retries: u32,
        reporter: Arc<dyn FailureReporter>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                available: Notify::new(),
                backoff,
                max_retries,
                reporter,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // The state is left consistent at every unlock, so a poisoned lock is still usable
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a key unless it is already waiting
    ///
    /// Returns `true` if the key became pending (or parked behind its in-flight
    /// occurrence), `false` if it was already waiting or the queue is shut down.
    pub fn add(&self, key: WorkKey) -> bool {
        match self.insert(key) {
            Insert::Pending | Insert::Parked => true,
            Insert::Duplicate | Insert::Rejected(_) => false,
        }
    }

    fn insert(&self, key: WorkKey) -> Insert {
        let mut state = self.lock();
        if state.shutting_down {
            warn!(key = %key, "queue.add.rejected_shutting_down");
            return Insert::Rejected(key);
        }
        if !state.dirty.insert(key.clone()) {
            debug!(key = %key, "queue.add.deduplicated");
            return Insert::Duplicate;
        }
        if state.in_flight.contains(&key) {
            debug!(key = %key, "queue.add.parked");
            return Insert::Parked;
        }
        state.pending.push_back(key);
        metrics::set_queue_depth(state.pending.len());
        drop(state);
        self.shared.available.notify_one();
        Insert::Pending
    }

    /// Wait for the next key
    ///
    /// Returns `None` once the queue is shut down and every pending key has been
    /// handed out. After that every call returns `None` immediately.
    pub async fn take(&self) -> Option<WorkKey> {
        loop {
            let notified = self.shared.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(key) = state.pending.pop_front() {
                    state.dirty.remove(&key);
                    state.in_flight.insert(key.clone());
                    metrics::set_queue_depth(state.pending.len());
                    metrics::set_keys_in_flight(state.in_flight.len());
                    let more = !state.pending.is_empty();
                    drop(state);
                    if more {
                        // Pass the wakeup on so a queued key never waits behind an idle worker
                        self.shared.available.notify_one();
                    }
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Release a key's in-flight slot
    ///
    /// If the key was re-added while in flight it becomes pending again.
    pub fn done(&self, key: &WorkKey) {
        let mut state = self.lock();
        if !state.in_flight.remove(key) {
            return;
        }
        metrics::set_keys_in_flight(state.in_flight.len());
        if state.dirty.contains(key) {
            state.pending.push_back(key.clone());
            metrics::set_queue_depth(state.pending.len());
            drop(state);
            self.shared.available.notify_one();
        }
    }

    /// Clear the retry counter of a key
    pub fn forget(&self, key: &WorkKey) {
        self.lock().failures.remove(key);
    }

    /// Schedule a failed key for another attempt
    ///
    /// Increments the key's failure counter. Keys over the retry budget are
    /// dropped and reported instead of rescheduled. The caller still owns the
    /// in-flight slot and must call [`KeyQueue::done`].
    pub fn requeue_after<E>(&self, key: &WorkKey, error: &E) -> Requeue
    where
        E: fmt::Display + ?Sized,
    {
        let attempt = {
            let mut state = self.lock();
            if state.shutting_down {
                state.failures.remove(key);
                drop(state);
                self.report_abandon(key, &error.to_string());
                return Requeue::ShuttingDown;
            }
            let count = state.failures.entry(key.clone()).or_insert(0);
            *count = count.saturating_add(1);
            let attempt = *count;
            if attempt > self.shared.max_retries {
                state.failures.remove(key);
                drop(state);
                self.report_drop(key, attempt, error);
                return Requeue::Dropped { attempts: attempt };
            }
            attempt
        };

        let delay = self.shared.backoff.delay_for(attempt);
        metrics::increment_requeues_total();

        let queue = self.clone();
        let retry_key = key.clone();
        let last_error = error.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Insert::Rejected(key) = queue.insert(retry_key) {
                queue.lock().failures.remove(&key);
                queue.report_abandon(&key, &last_error);
            }
        });

        Requeue::Scheduled { attempt, delay }
    }

    /// Drop a failed key without retrying and report it
    pub fn drop_failed<E>(&self, key: &WorkKey, error: &E) -> Requeue
    where
        E: fmt::Display + ?Sized,
    {
        let attempts = {
            let mut state = self.lock();
            state
                .failures
                .remove(key)
                .unwrap_or(0)
                .saturating_add(1)
        };
        self.report_drop(key, attempts, error);
        Requeue::Dropped { attempts }
    }

    fn report_drop<E>(&self, key: &WorkKey, attempts: u32, error: &E)
    where
        E: fmt::Display + ?Sized,
    {
        metrics::increment_dropped_keys_total();
        self.shared
            .reporter
            .report_dropped(key, attempts, &error.to_string());
    }

    fn report_abandon(&self, key: &WorkKey, error: &str) {
        metrics::increment_abandoned_keys_total();
        self.shared.reporter.report_abandoned(key, error);
    }

    /// Stop accepting keys and wake every waiting worker
    ///
    /// Keys that are already pending are still handed out by `take`.
    pub fn shutdown(&self) {
        {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            state.shutting_down = true;
        }
        debug!("queue.shutdown");
        self.shared.available.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Number of keys waiting to be taken
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys currently held by workers
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn is_in_flight(&self, key: &WorkKey) -> bool {
        self.lock().in_flight.contains(key)
    }

    /// Failures recorded for a key since its last success
    pub fn failures(&self, key: &WorkKey) -> u32 {
        self.lock().failures.get(key).copied().unwrap_or(0)
    }
}
