//! Live query controller
//!
//! A [`GeoQuery`] watches a circular region of the store and streams
//! membership events to registered callbacks: `key_entered` when a key
//! appears inside the circle, `key_moved` when it relocates within it,
//! `key_exited` when it leaves or is deleted, and `ready` once the
//! initial backlog of every planned range has been delivered.
//!
//! All query state sits behind one mutex, giving the single-logical-
//! event-loop semantics of the system: datastore events are reconciled
//! under the lock, user callbacks are invoked after it is released, and
//! the cancelled flag is re-checked before every single dispatch so
//! `cancel()` may be called from inside any callback.

use crate::error::{GeoWatchError, Result};
use crate::geohash;
use crate::ranges::{self, GeohashRange};
use crate::spatial::Point;
use crate::store::{ChildCallback, ListenerHandle, RealtimeStore, StoredRecord, ValueCallback};
use crate::subscription::{CleanupScheduler, RangeHandles, SubscriptionSet};
use crate::tracker::{KeyTransition, MembershipTracker};
use crate::types::{Config, QueryCriteria};
use rustc_hash::FxHashSet;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, error, warn};

/// The events a query can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Initial data for the current criteria has been delivered
    Ready,
    /// A key moved into the query circle (or was first observed inside)
    KeyEntered,
    /// A key left the query circle or was deleted
    KeyExited,
    /// A key relocated while staying inside the circle
    KeyMoved,
}

impl EventType {
    /// Wire name of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Ready => "ready",
            EventType::KeyEntered => "key_entered",
            EventType::KeyExited => "key_exited",
            EventType::KeyMoved => "key_moved",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = GeoWatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ready" => Ok(EventType::Ready),
            "key_entered" => Ok(EventType::KeyEntered),
            "key_exited" => Ok(EventType::KeyExited),
            "key_moved" => Ok(EventType::KeyMoved),
            other => Err(GeoWatchError::InvalidCriteria(format!(
                "unknown event type {other:?}"
            ))),
        }
    }
}

/// Callback for the `ready` event
pub type ReadyCallback = Arc<dyn Fn() + Send + Sync>;
/// Callback for `key_entered` and `key_moved`: key, location, distance
/// from the center in km
pub type KeyEventCallback = Arc<dyn Fn(&str, Point, f64) + Send + Sync>;
/// Callback for `key_exited`; the payload is `None` when the key was
/// deleted outright
pub type KeyExitCallback = Arc<dyn Fn(&str, Option<Point>, Option<f64>) + Send + Sync>;

#[derive(Default)]
struct CallbackRegistry {
    ready: Vec<(u64, ReadyCallback)>,
    entered: Vec<(u64, KeyEventCallback)>,
    moved: Vec<(u64, KeyEventCallback)>,
    exited: Vec<(u64, KeyExitCallback)>,
}

impl CallbackRegistry {
    fn clear(&mut self) {
        self.ready.clear();
        self.entered.clear();
        self.moved.clear();
        self.exited.clear();
    }

    fn remove(&mut self, event: EventType, id: u64) {
        match event {
            EventType::Ready => self.ready.retain(|(slot, _)| *slot != id),
            EventType::KeyEntered => self.entered.retain(|(slot, _)| *slot != id),
            EventType::KeyExited => self.exited.retain(|(slot, _)| *slot != id),
            EventType::KeyMoved => self.moved.retain(|(slot, _)| *slot != id),
        }
    }
}

/// Cancellation token for one registered callback.
///
/// Returned by the `on_*` registration methods; `cancel` removes exactly
/// the callback it was returned for. Dropping the registration does
/// nothing — the callback stays registered until the registration or the
/// whole query is cancelled.
pub struct CallbackRegistration {
    core: Weak<QueryCore>,
    event: EventType,
    id: u64,
}

impl CallbackRegistration {
    fn inert(event: EventType) -> Self {
        Self {
            core: Weak::new(),
            event,
            id: u64::MAX,
        }
    }

    /// Remove the registered callback. A second call is a no-op.
    pub fn cancel(&self) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        let Ok(mut state) = core.state() else {
            return;
        };
        state.callbacks.remove(self.event, self.id);
    }
}

struct QueryState {
    center: Point,
    radius_km: f64,
    cancelled: bool,
    /// Whether the ready barrier has completed for the current criteria
    value_event_fired: bool,
    /// Whether a debounced cleanup is pending
    cleanup_scheduled: bool,
    /// Bumped on every re-plan so a reconcile interrupted by a
    /// re-entrant criteria change does not install stale ranges
    plan_generation: u64,
    tracker: MembershipTracker,
    subscriptions: SubscriptionSet,
    /// Newly opened ranges whose value barrier has not fired yet
    outstanding_ready: FxHashSet<GeohashRange>,
    callbacks: CallbackRegistry,
    next_registration_id: u64,
}

pub(crate) struct QueryCore {
    store: Arc<dyn RealtimeStore>,
    config: Config,
    state: Mutex<QueryState>,
    scheduler: CleanupScheduler,
}

impl QueryCore {
    fn state(&self) -> Result<MutexGuard<'_, QueryState>> {
        self.state.lock().map_err(|_| GeoWatchError::Lock)
    }

    fn is_cancelled(&self) -> bool {
        self.state().map(|state| state.cancelled).unwrap_or(true)
    }

    /// Reconcile one `child_added`/`child_changed` delivery.
    fn handle_child_update(core: &Arc<Self>, key: &str, record: &StoredRecord) {
        let transition = {
            let Ok(mut state) = core.state() else {
                return;
            };
            if state.cancelled {
                return;
            }
            let center = state.center;
            let radius_km = state.radius_km;
            match state.tracker.update(
                key,
                record.location(),
                &center,
                radius_km,
                core.config.geohash_precision,
            ) {
                Ok(transition) => transition,
                Err(err) => {
                    warn!(key, %err, "ignoring malformed remote record");
                    return;
                }
            }
        };
        if let Some(transition) = transition {
            Self::dispatch_key_transition(core, &transition);
        }
    }

    /// Resolve one `child_removed` delivery.
    ///
    /// A removal may mean the key is gone, or merely that it moved into
    /// another range this query also subscribes to (the store fires a
    /// removal from the old range and an addition into the new one). A
    /// fresh point read disambiguates; it is the only operation here
    /// that suspends.
    fn handle_child_removed(core: &Arc<Self>, key: &str) {
        {
            let Ok(state) = core.state() else {
                return;
            };
            if state.cancelled || !state.tracker.contains(key) {
                return;
            }
        }

        let current = match core.store.get(key) {
            Ok(current) => current,
            Err(err) => {
                warn!(key, %err, "point lookup failed while resolving removal");
                return;
            }
        };

        let transition = {
            let Ok(mut state) = core.state() else {
                return;
            };
            if state.cancelled {
                return;
            }
            let center = state.center;
            match &current {
                Some(record) => {
                    let location = record.location();
                    match geohash::encode(&location, core.config.geohash_precision) {
                        // Still covered: the addition into the other
                        // range reconciles this key.
                        Ok(hash) if state.subscriptions.contains_hash(&hash) => None,
                        Ok(_) => state.tracker.remove(key, Some(location), &center),
                        Err(err) => {
                            warn!(key, %err, "record relocated to a malformed location");
                            state.tracker.remove(key, None, &center)
                        }
                    }
                }
                None => state.tracker.remove(key, None, &center),
            }
        };
        if let Some(transition) = transition {
            Self::dispatch_key_transition(core, &transition);
        }
    }

    /// One range's value barrier fired: retire it and complete the
    /// ready barrier when it was the last one outstanding.
    fn complete_range_ready(core: &Arc<Self>, range: &GeohashRange) {
        let fire = {
            let Ok(mut state) = core.state() else {
                return;
            };
            if state.cancelled {
                return;
            }
            state.outstanding_ready.remove(range);
            if state.outstanding_ready.is_empty() && !state.value_event_fired {
                state.value_event_fired = true;
                true
            } else {
                false
            }
        };
        if fire {
            debug!("query ready");
            Self::dispatch_ready(core);
        }
    }

    /// Recompute the range plan and reconcile subscriptions with it.
    fn refresh_subscriptions(core: &Arc<Self>) -> Result<()> {
        let (to_open, generation, schedule) = {
            let mut state = core.state()?;
            if state.cancelled {
                return Ok(());
            }
            state.plan_generation += 1;
            let generation = state.plan_generation;
            let radius_m = state.radius_km * 1000.0;
            let targets =
                ranges::ranges_for_circle(&state.center, radius_m, core.config.geohash_precision)?;
            let to_open = state.subscriptions.mark_targets(&targets);
            state.outstanding_ready = to_open.iter().cloned().collect();
            debug!(
                planned = targets.len(),
                opening = to_open.len(),
                held = state.subscriptions.len(),
                "range plan refreshed"
            );

            let schedule =
                state.subscriptions.len() > core.config.max_idle_ranges && !state.cleanup_scheduled;
            if schedule {
                state.cleanup_scheduled = true;
            }
            (to_open, generation, schedule)
        };
        if schedule {
            core.scheduler.schedule_debounce();
        }

        if to_open.is_empty() {
            // No value events will fire for this plan; the barrier
            // completes right away.
            let fire = {
                let mut state = core.state()?;
                if state.cancelled || state.plan_generation != generation {
                    return Ok(());
                }
                if state.value_event_fired {
                    false
                } else {
                    state.value_event_fired = true;
                    true
                }
            };
            if fire {
                Self::dispatch_ready(core);
            }
            return Ok(());
        }

        for range in to_open {
            // Backlog and barrier events flow during the subscribe
            // calls below, so the state lock must not be held here.
            let weak = Arc::downgrade(core);
            let added: ChildCallback = {
                let weak = weak.clone();
                Arc::new(move |key, record| {
                    if let Some(core) = weak.upgrade() {
                        QueryCore::handle_child_update(&core, key, record);
                    }
                })
            };
            let changed: ChildCallback = {
                let weak = weak.clone();
                Arc::new(move |key, record| {
                    if let Some(core) = weak.upgrade() {
                        QueryCore::handle_child_update(&core, key, record);
                    }
                })
            };
            let removed: ChildCallback = {
                let weak = weak.clone();
                Arc::new(move |key, _record| {
                    if let Some(core) = weak.upgrade() {
                        QueryCore::handle_child_removed(&core, key);
                    }
                })
            };
            let barrier_done = Arc::new(AtomicBool::new(false));
            let value: ValueCallback = {
                let weak = weak.clone();
                let done = barrier_done.clone();
                let range = range.clone();
                Arc::new(move || {
                    // One-shot: later value events on this range are
                    // not barrier completions.
                    if done.swap(true, Ordering::SeqCst) {
                        return;
                    }
                    if let Some(core) = weak.upgrade() {
                        QueryCore::complete_range_ready(&core, &range);
                    }
                })
            };

            let added_handle = core.store.on_child_added(&range, added)?;
            let changed_handle = core.store.on_child_changed(&range, changed)?;
            let removed_handle = core.store.on_child_removed(&range, removed)?;
            let value_handle = core.store.on_value(&range, value)?;
            let value_handle = if barrier_done.load(Ordering::SeqCst) {
                core.store.detach(value_handle)?;
                None
            } else {
                Some(value_handle)
            };

            let stale = {
                let mut state = core.state()?;
                if state.cancelled || state.plan_generation != generation {
                    true
                } else {
                    state.subscriptions.insert(
                        range.clone(),
                        RangeHandles {
                            added: added_handle,
                            changed: changed_handle,
                            removed: removed_handle,
                            value: value_handle,
                        },
                    );
                    false
                }
            };
            if stale {
                // A re-entrant criteria change or cancel superseded
                // this plan; its listeners must not survive.
                let orphaned: Vec<ListenerHandle> =
                    [Some(added_handle), Some(changed_handle), Some(removed_handle), value_handle]
                        .into_iter()
                        .flatten()
                        .collect();
                SubscriptionSet::detach_all(&core.store, orphaned)?;
                return Ok(());
            }
        }
        Ok(())
    }

    /// Sweep inactive ranges and garbage-collect uncovered keys. Runs
    /// on the scheduler thread.
    fn run_cleanup(core: &Arc<Self>) {
        let handles = {
            let Ok(mut state) = core.state() else {
                return;
            };
            if state.cancelled {
                return;
            }
            let handles = state.subscriptions.sweep();

            let QueryState {
                tracker,
                subscriptions,
                ..
            } = &mut *state;
            match tracker.garbage_collect(|hash| subscriptions.contains_hash(hash)) {
                Ok(dropped) if dropped > 0 => {
                    debug!(dropped, "dropped uncovered tracked locations");
                }
                Ok(_) => {}
                Err(err) => {
                    error!(%err, "membership and range bookkeeping diverged");
                    debug_assert!(false, "{err}");
                }
            }
            state.cleanup_scheduled = false;
            handles
        };
        if let Err(err) = SubscriptionSet::detach_all(&core.store, handles) {
            warn!(%err, "failed to detach idle range listeners");
        }
    }

    fn cancel(core: &Arc<Self>) {
        let handles = {
            let Ok(mut state) = core.state() else {
                return;
            };
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            state.callbacks.clear();
            state.tracker.clear();
            state.outstanding_ready.clear();
            state.subscriptions.cancel_all()
        };
        core.scheduler.stop();
        if let Err(err) = SubscriptionSet::detach_all(&core.store, handles) {
            warn!(%err, "failed to detach listeners during cancel");
        }
        debug!("query cancelled");
    }

    /// Invoke the callbacks registered for a transition, re-checking
    /// the cancelled flag before every invocation.
    fn dispatch_key_transition(core: &Arc<Self>, transition: &KeyTransition) {
        match transition {
            KeyTransition::Entered {
                key,
                location,
                distance_km,
            } => {
                let callbacks: Vec<KeyEventCallback> = match core.state() {
                    Ok(state) if !state.cancelled => {
                        state.callbacks.entered.iter().map(|(_, cb)| cb.clone()).collect()
                    }
                    _ => return,
                };
                for callback in callbacks {
                    if core.is_cancelled() {
                        return;
                    }
                    callback(key, *location, *distance_km);
                }
            }
            KeyTransition::Moved {
                key,
                location,
                distance_km,
            } => {
                let callbacks: Vec<KeyEventCallback> = match core.state() {
                    Ok(state) if !state.cancelled => {
                        state.callbacks.moved.iter().map(|(_, cb)| cb.clone()).collect()
                    }
                    _ => return,
                };
                for callback in callbacks {
                    if core.is_cancelled() {
                        return;
                    }
                    callback(key, *location, *distance_km);
                }
            }
            KeyTransition::Exited {
                key,
                location,
                distance_km,
            } => {
                let callbacks: Vec<KeyExitCallback> = match core.state() {
                    Ok(state) if !state.cancelled => {
                        state.callbacks.exited.iter().map(|(_, cb)| cb.clone()).collect()
                    }
                    _ => return,
                };
                for callback in callbacks {
                    if core.is_cancelled() {
                        return;
                    }
                    callback(key, *location, *distance_km);
                }
            }
        }
    }

    fn dispatch_ready(core: &Arc<Self>) {
        let callbacks: Vec<ReadyCallback> = match core.state() {
            Ok(state) if !state.cancelled => {
                state.callbacks.ready.iter().map(|(_, cb)| cb.clone()).collect()
            }
            _ => return,
        };
        for callback in callbacks {
            if core.is_cancelled() {
                return;
            }
            callback();
        }
    }
}

/// A live query over a circular region of the store.
///
/// Created by [`GeoWatch::query`](crate::GeoWatch::query). The query
/// owns its range subscriptions and tracked-location cache; dropping the
/// handle cancels it.
///
/// # Example
///
/// ```rust
/// use geowatch::{GeoWatch, Point, QueryCriteria};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let geo = GeoWatch::memory();
/// let query = geo.query(QueryCriteria::new(Point::new(1.0, 2.0), 1000.0))?;
///
/// let registration = query.on_key_entered(|key, location, distance_km| {
///     println!("{key} entered at {location}, {distance_km:.1} km away");
/// });
///
/// geo.set("truck-17", Point::new(2.0, 3.0))?;
///
/// registration.cancel();
/// query.cancel();
/// # Ok(())
/// # }
/// ```
pub struct GeoQuery {
    core: Arc<QueryCore>,
}

impl GeoQuery {
    pub(crate) fn create(
        store: Arc<dyn RealtimeStore>,
        config: Config,
        criteria: QueryCriteria,
    ) -> Result<Self> {
        criteria.validate(true)?;
        let (Some(center), Some(radius_km)) = (criteria.center, criteria.radius_km) else {
            return Err(GeoWatchError::InvalidCriteria(
                "both center and radius are required".to_string(),
            ));
        };

        let debounce = config.cleanup_debounce();
        let sweep_interval = config.sweep_interval();
        let core = Arc::new_cyclic(|weak: &Weak<QueryCore>| {
            let cleanup_target = weak.clone();
            QueryCore {
                store,
                config,
                state: Mutex::new(QueryState {
                    center,
                    radius_km,
                    cancelled: false,
                    value_event_fired: false,
                    cleanup_scheduled: false,
                    plan_generation: 0,
                    tracker: MembershipTracker::new(),
                    subscriptions: SubscriptionSet::new(),
                    outstanding_ready: FxHashSet::default(),
                    callbacks: CallbackRegistry::default(),
                    next_registration_id: 0,
                }),
                scheduler: CleanupScheduler::start(debounce, sweep_interval, move || {
                    match cleanup_target.upgrade() {
                        Some(core) => {
                            QueryCore::run_cleanup(&core);
                            true
                        }
                        None => false,
                    }
                }),
            }
        });

        debug!(%center, radius_km, "query created");
        QueryCore::refresh_subscriptions(&core)?;
        Ok(Self { core })
    }

    /// Current center of the query circle.
    pub fn center(&self) -> Result<Point> {
        Ok(self.core.state()?.center)
    }

    /// Current radius of the query circle, in kilometers.
    pub fn radius(&self) -> Result<f64> {
        Ok(self.core.state()?.radius_km)
    }

    /// Whether the query has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.core.is_cancelled()
    }

    /// Move and/or resize the query circle.
    ///
    /// An absent field preserves its current value. Membership events
    /// implied by the new circle fire synchronously (enter/exit only —
    /// no key moved, the keys did not), then the range plan is
    /// recomputed and the ready barrier re-armed.
    ///
    /// After `cancel` this is a no-op.
    pub fn update_criteria(&self, criteria: QueryCriteria) -> Result<()> {
        criteria.validate(false)?;

        let keys = {
            let mut state = self.core.state()?;
            if state.cancelled {
                return Ok(());
            }
            if let Some(center) = criteria.center {
                state.center = center;
            }
            if let Some(radius_km) = criteria.radius_km {
                state.radius_km = radius_km;
            }
            state.tracker.keys()
        };

        // Re-evaluate every tracked key against the new circle,
        // dispatching as we go; a re-entrant cancel aborts the loop.
        for key in keys {
            let transition = {
                let mut state = self.core.state()?;
                if state.cancelled {
                    return Ok(());
                }
                let center = state.center;
                let radius_km = state.radius_km;
                state.tracker.reevaluate(&key, &center, radius_km)
            };
            if let Some(transition) = transition {
                QueryCore::dispatch_key_transition(&self.core, &transition);
            }
        }

        {
            let mut state = self.core.state()?;
            if state.cancelled {
                return Ok(());
            }
            state.value_event_fired = false;
        }
        QueryCore::refresh_subscriptions(&self.core)
    }

    /// Terminate the query: detach every subscription, clear the
    /// tracked locations and callbacks, and stop the cleanup timer.
    ///
    /// Idempotent and irreversible. Safe to call from inside any of
    /// this query's callbacks; no further callback fires afterwards.
    pub fn cancel(&self) {
        QueryCore::cancel(&self.core);
    }

    /// Register a `ready` callback.
    ///
    /// Fires once the initial data of every range in the current plan
    /// has been delivered, and again after each `update_criteria` once
    /// the re-planned ranges have loaded. If the query is already ready
    /// the callback fires synchronously before this method returns.
    pub fn on_ready<F>(&self, callback: F) -> CallbackRegistration
    where
        F: Fn() + Send + Sync + 'static,
    {
        let callback: ReadyCallback = Arc::new(callback);
        let (id, fire_now) = {
            let Ok(mut state) = self.core.state() else {
                return CallbackRegistration::inert(EventType::Ready);
            };
            let id = state.next_registration_id;
            state.next_registration_id += 1;
            state.callbacks.ready.push((id, callback.clone()));
            (id, state.value_event_fired && !state.cancelled)
        };
        if fire_now {
            callback();
        }
        CallbackRegistration {
            core: Arc::downgrade(&self.core),
            event: EventType::Ready,
            id,
        }
    }

    /// Register a `key_entered` callback.
    ///
    /// The callback is immediately replayed, synchronously, for every
    /// key currently inside the circle.
    pub fn on_key_entered<F>(&self, callback: F) -> CallbackRegistration
    where
        F: Fn(&str, Point, f64) + Send + Sync + 'static,
    {
        let callback: KeyEventCallback = Arc::new(callback);
        let (id, members) = {
            let Ok(mut state) = self.core.state() else {
                return CallbackRegistration::inert(EventType::KeyEntered);
            };
            let id = state.next_registration_id;
            state.next_registration_id += 1;
            state.callbacks.entered.push((id, callback.clone()));
            let members = if state.cancelled {
                Vec::new()
            } else {
                state.tracker.members()
            };
            (id, members)
        };
        for (key, location, distance_km) in members {
            if self.core.is_cancelled() {
                break;
            }
            callback(&key, location, distance_km);
        }
        CallbackRegistration {
            core: Arc::downgrade(&self.core),
            event: EventType::KeyEntered,
            id,
        }
    }

    /// Register a `key_moved` callback.
    pub fn on_key_moved<F>(&self, callback: F) -> CallbackRegistration
    where
        F: Fn(&str, Point, f64) + Send + Sync + 'static,
    {
        let callback: KeyEventCallback = Arc::new(callback);
        let Ok(mut state) = self.core.state() else {
            return CallbackRegistration::inert(EventType::KeyMoved);
        };
        let id = state.next_registration_id;
        state.next_registration_id += 1;
        state.callbacks.moved.push((id, callback));
        drop(state);
        CallbackRegistration {
            core: Arc::downgrade(&self.core),
            event: EventType::KeyMoved,
            id,
        }
    }

    /// Register a `key_exited` callback.
    ///
    /// When the exit was caused by deletion the location and distance
    /// are `None`.
    pub fn on_key_exited<F>(&self, callback: F) -> CallbackRegistration
    where
        F: Fn(&str, Option<Point>, Option<f64>) + Send + Sync + 'static,
    {
        let callback: KeyExitCallback = Arc::new(callback);
        let Ok(mut state) = self.core.state() else {
            return CallbackRegistration::inert(EventType::KeyExited);
        };
        let id = state.next_registration_id;
        state.next_registration_id += 1;
        state.callbacks.exited.push((id, callback));
        drop(state);
        CallbackRegistration {
            core: Arc::downgrade(&self.core),
            event: EventType::KeyExited,
            id,
        }
    }
}

impl Drop for GeoQuery {
    fn drop(&mut self) {
        QueryCore::cancel(&self.core);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::DEFAULT_GEOHASH_PRECISION;
    use std::sync::atomic::AtomicUsize;

    fn query_with_store() -> (Arc<MemoryStore>, GeoQuery) {
        let store = Arc::new(MemoryStore::new());
        let query = GeoQuery::create(
            store.clone(),
            Config::default(),
            QueryCriteria::new(Point::new(1.0, 2.0), 1000.0),
        )
        .unwrap();
        (store, query)
    }

    fn put(store: &MemoryStore, key: &str, lat: f64, lon: f64) {
        let location = Point::new(lat, lon);
        let g = geohash::encode(&location, DEFAULT_GEOHASH_PRECISION).unwrap();
        store.put(key, StoredRecord::new(g, &location)).unwrap();
    }

    #[test]
    fn test_event_type_parsing() {
        assert_eq!("ready".parse::<EventType>().unwrap(), EventType::Ready);
        assert_eq!(
            "key_entered".parse::<EventType>().unwrap(),
            EventType::KeyEntered
        );
        assert_eq!(
            "key_exited".parse::<EventType>().unwrap(),
            EventType::KeyExited
        );
        assert_eq!("key_moved".parse::<EventType>().unwrap(), EventType::KeyMoved);
        assert!("key_teleported".parse::<EventType>().is_err());
        assert_eq!(EventType::KeyEntered.to_string(), "key_entered");
    }

    #[test]
    fn test_create_requires_full_criteria() {
        let store: Arc<dyn RealtimeStore> = Arc::new(MemoryStore::new());
        let err = GeoQuery::create(
            store,
            Config::default(),
            QueryCriteria::from_center(Point::new(1.0, 2.0)),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_center_radius_accessors() {
        let (_store, query) = query_with_store();
        assert_eq!(query.center().unwrap(), Point::new(1.0, 2.0));
        assert_eq!(query.radius().unwrap(), 1000.0);

        query
            .update_criteria(QueryCriteria::from_radius(250.0))
            .unwrap();
        assert_eq!(query.center().unwrap(), Point::new(1.0, 2.0));
        assert_eq!(query.radius().unwrap(), 250.0);
    }

    #[test]
    fn test_ready_fires_synchronously_when_already_ready() {
        let (_store, query) = query_with_store();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        query.on_ready(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        // MemoryStore delivers backlog synchronously, so the query was
        // ready before the registration.
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registration_cancel_is_single_shot() {
        let (store, query) = query_with_store();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let registration = query.on_key_entered(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        registration.cancel();
        registration.cancel(); // double-cancel is a no-op

        put(&store, "loc1", 2.0, 3.0);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_is_idempotent_and_terminal() {
        let (store, query) = query_with_store();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        query.on_key_entered(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        query.cancel();
        query.cancel();
        assert!(query.is_cancelled());

        put(&store, "loc1", 2.0, 3.0);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(store.stats().unwrap().listener_count, 0);

        // update_criteria after cancel is a no-op, not an error.
        query
            .update_criteria(QueryCriteria::from_radius(5.0))
            .unwrap();
        assert_eq!(store.stats().unwrap().listener_count, 0);

        // A registration taken after cancel still cancels cleanly.
        let registration = query.on_key_moved(|_, _, _| {});
        registration.cancel();
    }

    #[test]
    fn test_drop_cancels_query() {
        let (store, query) = query_with_store();
        assert!(store.stats().unwrap().listener_count > 0);
        drop(query);
        assert_eq!(store.stats().unwrap().listener_count, 0);
    }
}
