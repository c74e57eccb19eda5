//! Subscription manager
//!
//! Bookkeeping for the range subscriptions a live query holds against
//! the datastore, plus the background scheduler that drives deferred
//! teardown.
//!
//! Ranges are not closed the moment the planner stops needing them: a
//! query whose center pans by small amounts would thrash its range set,
//! closing subscriptions the datastore just opened. Instead a range
//! falling out of the plan is only marked inactive, and a debounced
//! cleanup (plus a periodic sweep) detaches it later.

use crate::error::Result;
use crate::ranges::GeohashRange;
use crate::store::{ListenerHandle, RealtimeStore};
use rustc_hash::FxHashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// The four listener handles attached per range.
///
/// The `value` handle doubles as the per-range ready barrier; it is
/// detached as soon as it has fired once.
#[derive(Debug)]
pub(crate) struct RangeHandles {
    pub added: ListenerHandle,
    pub changed: ListenerHandle,
    pub removed: ListenerHandle,
    pub value: Option<ListenerHandle>,
}

impl RangeHandles {
    fn drain(self) -> impl Iterator<Item = ListenerHandle> {
        [self.added, self.changed, self.removed]
            .into_iter()
            .chain(self.value)
    }
}

/// State of one range subscription held by a query
#[derive(Debug)]
pub(crate) struct RangeState {
    /// Whether the current plan still wants this range
    pub active: bool,
    pub handles: RangeHandles,
}

/// The set of range subscriptions a query currently holds
#[derive(Default)]
pub(crate) struct SubscriptionSet {
    entries: FxHashMap<GeohashRange, RangeState>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Reconcile the set against the planner's current output.
    ///
    /// Entries absent from `targets` are marked inactive; entries
    /// re-encountered as targets are reactivated without reopening.
    /// Returns the targets not yet present, which the caller must open.
    pub fn mark_targets(&mut self, targets: &[GeohashRange]) -> Vec<GeohashRange> {
        for (range, state) in self.entries.iter_mut() {
            state.active = targets.contains(range);
        }
        targets
            .iter()
            .filter(|range| !self.entries.contains_key(*range))
            .cloned()
            .collect()
    }

    /// Record a freshly opened range.
    pub fn insert(&mut self, range: GeohashRange, handles: RangeHandles) {
        self.entries.insert(
            range,
            RangeState {
                active: true,
                handles,
            },
        );
    }

    /// Whether any held range (active or pending teardown) covers the
    /// geohash.
    pub fn contains_hash(&self, hash: &str) -> bool {
        self.entries.keys().any(|range| range.contains(hash))
    }

    /// Drop every inactive entry, returning the handles to detach.
    pub fn sweep(&mut self) -> Vec<ListenerHandle> {
        let doomed: Vec<GeohashRange> = self
            .entries
            .iter()
            .filter(|(_, state)| !state.active)
            .map(|(range, _)| range.clone())
            .collect();

        let mut handles = Vec::new();
        for range in doomed {
            if let Some(state) = self.entries.remove(&range) {
                debug!(range = %range, "tearing down idle range");
                handles.extend(state.handles.drain());
            }
        }
        handles
    }

    /// Drop everything, returning the handles to detach. Idempotent.
    pub fn cancel_all(&mut self) -> Vec<ListenerHandle> {
        self.entries
            .drain()
            .flat_map(|(_, state)| state.handles.drain())
            .collect()
    }

    /// Detach a batch of handles from the store.
    pub fn detach_all(store: &Arc<dyn RealtimeStore>, handles: Vec<ListenerHandle>) -> Result<()> {
        for handle in handles {
            store.detach(handle)?;
        }
        Ok(())
    }
}

struct SchedulerState {
    stopped: bool,
    /// Deadline of a pending debounced cleanup, if one is scheduled
    debounce_due: Option<Instant>,
}

struct SchedulerShared {
    state: Mutex<SchedulerState>,
    condvar: Condvar,
}

/// Drives the deferred-teardown policy for one query.
///
/// A background thread runs the cleanup closure whenever a debounced
/// request comes due and on every periodic sweep interval. The thread
/// parks on a condvar between deadlines and exits as soon as `stop` is
/// called or the closure reports the query is gone.
pub(crate) struct CleanupScheduler {
    shared: Arc<SchedulerShared>,
    debounce: Duration,
}

impl CleanupScheduler {
    /// Spawn the scheduler thread.
    ///
    /// `cleanup` runs on the scheduler thread; it returns `false` when
    /// the query no longer exists, which ends the thread.
    pub fn start<F>(debounce: Duration, sweep_interval: Duration, cleanup: F) -> Self
    where
        F: Fn() -> bool + Send + 'static,
    {
        let shared = Arc::new(SchedulerShared {
            state: Mutex::new(SchedulerState {
                stopped: false,
                debounce_due: None,
            }),
            condvar: Condvar::new(),
        });

        let thread_shared = shared.clone();
        std::thread::spawn(move || {
            let mut next_sweep = Instant::now() + sweep_interval;
            let Ok(mut state) = thread_shared.state.lock() else {
                return;
            };
            loop {
                if state.stopped {
                    return;
                }
                let deadline = state.debounce_due.map_or(next_sweep, |d| d.min(next_sweep));
                let now = Instant::now();
                if now < deadline {
                    let Ok((guard, _)) = thread_shared
                        .condvar
                        .wait_timeout(state, deadline - now)
                    else {
                        return;
                    };
                    state = guard;
                    continue;
                }

                state.debounce_due = None;
                drop(state);
                if !cleanup() {
                    return;
                }
                next_sweep = Instant::now() + sweep_interval;
                let Ok(guard) = thread_shared.state.lock() else {
                    return;
                };
                state = guard;
            }
        });

        Self { shared, debounce }
    }

    /// Request a cleanup after the debounce interval; a pending request
    /// is left as is.
    pub fn schedule_debounce(&self) {
        if let Ok(mut state) = self.shared.state.lock() {
            if state.debounce_due.is_none() {
                state.debounce_due = Some(Instant::now() + self.debounce);
                self.shared.condvar.notify_one();
            }
        }
    }

    /// Stop the scheduler thread. Idempotent.
    pub fn stop(&self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.stopped = true;
            self.shared.condvar.notify_one();
        }
    }
}

impl Drop for CleanupScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
