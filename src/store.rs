//! Realtime datastore abstraction
//!
//! This module provides a trait-based abstraction over the tree-structured
//! realtime database underneath the query engine, allowing different
//! backends while maintaining a consistent API. The contract mirrors
//! ordered-child range subscriptions: a live view of records sorted by
//! their geohash field, with per-child add/change/remove notifications, a
//! `value` barrier after backlog delivery, and one-shot point reads.
//!
//! [`MemoryStore`] is the in-process implementation used by tests, the
//! demo binary, and any embedded deployment.

use crate::error::{GeoWatchError, Result};
use crate::ranges::GeohashRange;
use crate::spatial::Point;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Wire form of a stored point.
///
/// Both fields are written atomically by the writer; a reader that sees
/// only one of them treats the record as absent (deserialization fails).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Geohash of the location, exactly the system precision long
    pub g: String,
    /// Coordinates as `[latitude, longitude]`
    pub l: [f64; 2],
}

impl StoredRecord {
    /// Build a record from a geohash and its location.
    pub fn new(g: impl Into<String>, location: &Point) -> Self {
        Self {
            g: g.into(),
            l: [location.lat, location.lon],
        }
    }

    /// The record's coordinates as a point.
    pub fn location(&self) -> Point {
        Point::new(self.l[0], self.l[1])
    }
}

/// Callback for per-child range events; receives the child key and its
/// record (for removals, the record as it was before removal).
pub type ChildCallback = std::sync::Arc<dyn Fn(&str, &StoredRecord) + Send + Sync>;

/// Callback for the `value` barrier event.
pub type ValueCallback = std::sync::Arc<dyn Fn() + Send + Sync>;

/// Opaque identity of an attached listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

/// Contract required of the underlying realtime datastore.
///
/// Range subscriptions observe the live view of records whose `g` field
/// sorts within the range:
///
/// - `on_child_added` fires for every matching record already present
///   (in `g` order, before the call returns) and for every future
///   insertion or move into the range.
/// - `on_child_changed` fires for every future mutation of a matching
///   record that stays in the range.
/// - `on_child_removed` fires for every record that leaves the range,
///   by deletion or by its `g` moving out; the callback receives the
///   record as it was before it left.
/// - `on_value` fires once after the backlog has been delivered and
///   again after every subsequent mutation touching the range.
///
/// Implementations must never invoke a callback while holding a lock the
/// callback could re-enter, and must serialize callbacks with respect to
/// the mutation that triggered them.
pub trait RealtimeStore: Send + Sync {
    /// Write a record at `key`, atomically replacing any previous one.
    fn put(&self, key: &str, record: StoredRecord) -> Result<()>;

    /// Delete the record at `key`; absent keys are a no-op.
    fn remove(&self, key: &str) -> Result<()>;

    /// One-shot read of the record at `key`.
    fn get(&self, key: &str) -> Result<Option<StoredRecord>>;

    /// Attach a `child_added` listener to a range.
    fn on_child_added(&self, range: &GeohashRange, callback: ChildCallback)
        -> Result<ListenerHandle>;

    /// Attach a `child_changed` listener to a range.
    fn on_child_changed(
        &self,
        range: &GeohashRange,
        callback: ChildCallback,
    ) -> Result<ListenerHandle>;

    /// Attach a `child_removed` listener to a range.
    fn on_child_removed(
        &self,
        range: &GeohashRange,
        callback: ChildCallback,
    ) -> Result<ListenerHandle>;

    /// Attach a `value` listener to a range.
    fn on_value(&self, range: &GeohashRange, callback: ValueCallback) -> Result<ListenerHandle>;

    /// Detach a previously attached listener; unknown handles are a
    /// no-op.
    fn detach(&self, handle: ListenerHandle) -> Result<()>;
}

/// Statistics about a [`MemoryStore`]
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Number of records currently stored
    pub record_count: usize,
    /// Number of attached listeners
    pub listener_count: usize,
}

enum ListenerKind {
    ChildAdded(ChildCallback),
    ChildChanged(ChildCallback),
    ChildRemoved(ChildCallback),
    Value(ValueCallback),
}

struct Listener {
    id: u64,
    range: GeohashRange,
    kind: ListenerKind,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Records by key
    records: HashMap<String, StoredRecord>,
    /// (geohash, key) index giving the ordered-by-`g` live view
    ordered: BTreeSet<(String, String)>,
    /// Attached listeners, in registration order
    listeners: Vec<Listener>,
}

impl MemoryStoreInner {
    fn range_bounds(range: &GeohashRange) -> impl std::ops::RangeBounds<(String, String)> {
        use std::ops::Bound;
        let lower = Bound::Included((range.start.clone(), String::new()));
        // '\0' sorts below every key byte, so this excludes exactly the
        // geohashes above the inclusive end.
        let upper = Bound::Excluded((format!("{}\0", range.end), String::new()));
        (lower, upper)
    }

    fn backlog(&self, range: &GeohashRange) -> Vec<(String, StoredRecord)> {
        self.ordered
            .range(Self::range_bounds(range))
            .filter_map(|(_, key)| {
                self.records
                    .get(key)
                    .map(|record| (key.clone(), record.clone()))
            })
            .collect()
    }
}

/// In-memory realtime store over a `BTreeSet` ordered index.
///
/// Mutations dispatch matching listeners synchronously on the mutating
/// thread, child events before `value` events, in listener registration
/// order. No internal lock is held while a callback runs, so callbacks
/// may call back into the store (including [`RealtimeStore::detach`]).
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
    next_listener_id: AtomicU64,
}

enum Dispatch {
    Child(ChildCallback, String, StoredRecord),
    Value(ValueCallback),
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record and listener counts.
    pub fn stats(&self) -> Result<StoreStats> {
        let inner = self.lock()?;
        Ok(StoreStats {
            record_count: inner.records.len(),
            listener_count: inner.listeners.len(),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryStoreInner>> {
        self.inner.lock().map_err(|_| GeoWatchError::Lock)
    }

    fn attach(&self, range: &GeohashRange, kind: ListenerKind) -> Result<ListenerHandle> {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.lock()?;
        inner.listeners.push(Listener {
            id,
            range: range.clone(),
            kind,
        });
        Ok(ListenerHandle(id))
    }

    fn run(dispatches: Vec<Dispatch>) {
        for dispatch in dispatches {
            match dispatch {
                Dispatch::Child(cb, key, record) => cb(&key, &record),
                Dispatch::Value(cb) => cb(),
            }
        }
    }
}

impl RealtimeStore for MemoryStore {
    fn put(&self, key: &str, record: StoredRecord) -> Result<()> {
        let dispatches = {
            let mut inner = self.lock()?;
            let old = inner.records.insert(key.to_string(), record.clone());
            if let Some(old) = &old {
                if *old == record {
                    return Ok(());
                }
                inner.ordered.remove(&(old.g.clone(), key.to_string()));
            }
            inner.ordered.insert((record.g.clone(), key.to_string()));

            let mut child = Vec::new();
            let mut value = Vec::new();
            for listener in &inner.listeners {
                let old_in = old.as_ref().is_some_and(|o| listener.range.contains(&o.g));
                let new_in = listener.range.contains(&record.g);
                match &listener.kind {
                    ListenerKind::ChildAdded(cb) if new_in && !old_in => {
                        child.push(Dispatch::Child(cb.clone(), key.to_string(), record.clone()));
                    }
                    ListenerKind::ChildChanged(cb) if new_in && old_in => {
                        child.push(Dispatch::Child(cb.clone(), key.to_string(), record.clone()));
                    }
                    ListenerKind::ChildRemoved(cb) if old_in && !new_in => {
                        // The departing record, as the range last saw it.
                        let departed = old.clone().unwrap_or_else(|| record.clone());
                        child.push(Dispatch::Child(cb.clone(), key.to_string(), departed));
                    }
                    ListenerKind::Value(cb) if old_in || new_in => {
                        value.push(Dispatch::Value(cb.clone()));
                    }
                    _ => {}
                }
            }
            child.extend(value);
            child
        };
        Self::run(dispatches);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let dispatches = {
            let mut inner = self.lock()?;
            let Some(old) = inner.records.remove(key) else {
                return Ok(());
            };
            inner.ordered.remove(&(old.g.clone(), key.to_string()));

            let mut child = Vec::new();
            let mut value = Vec::new();
            for listener in &inner.listeners {
                if !listener.range.contains(&old.g) {
                    continue;
                }
                match &listener.kind {
                    ListenerKind::ChildRemoved(cb) => {
                        child.push(Dispatch::Child(cb.clone(), key.to_string(), old.clone()));
                    }
                    ListenerKind::Value(cb) => value.push(Dispatch::Value(cb.clone())),
                    _ => {}
                }
            }
            child.extend(value);
            child
        };
        Self::run(dispatches);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<StoredRecord>> {
        Ok(self.lock()?.records.get(key).cloned())
    }

    fn on_child_added(
        &self,
        range: &GeohashRange,
        callback: ChildCallback,
    ) -> Result<ListenerHandle> {
        // Snapshot the backlog and register atomically, then replay
        // outside the lock so the callback may re-enter the store.
        let (handle, backlog) = {
            let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
            let mut inner = self.lock()?;
            let backlog = inner.backlog(range);
            inner.listeners.push(Listener {
                id,
                range: range.clone(),
                kind: ListenerKind::ChildAdded(callback.clone()),
            });
            (ListenerHandle(id), backlog)
        };
        debug!(range = %range, backlog = backlog.len(), "child_added listener attached");
        for (key, record) in &backlog {
            callback(key, record);
        }
        Ok(handle)
    }

    fn on_child_changed(
        &self,
        range: &GeohashRange,
        callback: ChildCallback,
    ) -> Result<ListenerHandle> {
        self.attach(range, ListenerKind::ChildChanged(callback))
    }

    fn on_child_removed(
        &self,
        range: &GeohashRange,
        callback: ChildCallback,
    ) -> Result<ListenerHandle> {
        self.attach(range, ListenerKind::ChildRemoved(callback))
    }

    fn on_value(&self, range: &GeohashRange, callback: ValueCallback) -> Result<ListenerHandle> {
        let handle = self.attach(range, ListenerKind::Value(callback.clone()))?;
        // Initial barrier: the backlog (delivered by on_child_added at
        // attach time) is complete by the time this runs.
        callback();
        Ok(handle)
    }

    fn detach(&self, handle: ListenerHandle) -> Result<()> {
        let mut inner = self.lock()?;
        inner.listeners.retain(|listener| listener.id != handle.0);
        Ok(())
    }
}
