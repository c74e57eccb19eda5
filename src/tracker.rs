//! Membership tracker
//!
//! Per-key cached state for one live query: where each observed key is,
//! how far it sits from the query center, and whether it is inside the
//! circle. Every datastore child event is reconciled here, and the
//! tracker decides which transition (if any) the event amounts to.
//!
//! The functions are pure with respect to dispatch: they return the
//! transition and the query controller invokes user callbacks, so the
//! tracker can be exercised without a datastore.

use crate::error::{GeoWatchError, Result};
use crate::geohash;
use crate::geometry;
use crate::spatial::Point;
use rustc_hash::FxHashMap;

/// Cached state for one key observed by a live query
#[derive(Debug, Clone)]
pub(crate) struct TrackedLocation {
    /// Last observed location
    pub location: Point,
    /// Distance from the query center at last reconciliation, in km
    pub distance_km: f64,
    /// Whether the key is inside the query circle
    pub is_in_query: bool,
    /// Geohash of the location at the system precision
    pub geohash: String,
}

/// A membership transition to be dispatched to user callbacks
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum KeyTransition {
    Entered {
        key: String,
        location: Point,
        distance_km: f64,
    },
    Moved {
        key: String,
        location: Point,
        distance_km: f64,
    },
    Exited {
        key: String,
        location: Option<Point>,
        distance_km: Option<f64>,
    },
}

/// Tracks every key observed by the active ranges of one query
#[derive(Debug, Default)]
pub(crate) struct MembershipTracker {
    entries: FxHashMap<String, TrackedLocation>,
}

impl MembershipTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Keys currently tracked, for the criteria-update sweep.
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Current members, for the `key_entered` replay on registration.
    pub fn members(&self) -> Vec<(String, Point, f64)> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_in_query)
            .map(|(key, entry)| (key.clone(), entry.location, entry.distance_km))
            .collect()
    }

    /// Reconcile a child added/changed event against the circle.
    ///
    /// Creates or updates the entry and reports the transition it
    /// implies, if any. Re-delivery of an unchanged record reports
    /// nothing.
    pub fn update(
        &mut self,
        key: &str,
        location: Point,
        center: &Point,
        radius_km: f64,
        precision: usize,
    ) -> Result<Option<KeyTransition>> {
        location.validate()?;
        let distance_km = geometry::distance_km(&location, center);
        let is_in_query = distance_km <= radius_km;

        let prior = self.entries.get(key);
        let was_in_query = prior.is_some_and(|entry| entry.is_in_query);
        let old_location = prior.map(|entry| entry.location);

        self.entries.insert(
            key.to_string(),
            TrackedLocation {
                location,
                distance_km,
                is_in_query,
                geohash: geohash::encode(&location, precision)?,
            },
        );

        let transition = if is_in_query && !was_in_query {
            Some(KeyTransition::Entered {
                key: key.to_string(),
                location,
                distance_km,
            })
        } else if is_in_query && old_location.is_some_and(|old| old != location) {
            Some(KeyTransition::Moved {
                key: key.to_string(),
                location,
                distance_km,
            })
        } else if !is_in_query && was_in_query {
            Some(KeyTransition::Exited {
                key: key.to_string(),
                location: Some(location),
                distance_km: Some(distance_km),
            })
        } else {
            None
        };
        Ok(transition)
    }

    /// Re-evaluate one key after the query circle changed.
    ///
    /// The location did not change, so this reports `Entered`/`Exited`
    /// only, never `Moved`.
    pub fn reevaluate(
        &mut self,
        key: &str,
        center: &Point,
        radius_km: f64,
    ) -> Option<KeyTransition> {
        let entry = self.entries.get_mut(key)?;
        let was_in_query = entry.is_in_query;
        entry.distance_km = geometry::distance_km(&entry.location, center);
        entry.is_in_query = entry.distance_km <= radius_km;

        if was_in_query && !entry.is_in_query {
            Some(KeyTransition::Exited {
                key: key.to_string(),
                location: Some(entry.location),
                distance_km: Some(entry.distance_km),
            })
        } else if !was_in_query && entry.is_in_query {
            Some(KeyTransition::Entered {
                key: key.to_string(),
                location: entry.location,
                distance_km: entry.distance_km,
            })
        } else {
            None
        }
    }

    /// Drop a key, reporting the exit if it was inside the circle.
    ///
    /// `current_location` is the key's location at removal time when it
    /// still exists somewhere, or `None` for a true deletion (the exit
    /// then carries a null payload).
    pub fn remove(
        &mut self,
        key: &str,
        current_location: Option<Point>,
        center: &Point,
    ) -> Option<KeyTransition> {
        let entry = self.entries.remove(key)?;
        if !entry.is_in_query {
            return None;
        }
        Some(KeyTransition::Exited {
            key: key.to_string(),
            location: current_location,
            distance_km: current_location.map(|location| geometry::distance_km(&location, center)),
        })
    }

    /// Drop every entry whose geohash is no longer covered by any range
    /// and which is outside the circle.
    ///
    /// An uncovered entry still marked inside the circle means range
    /// bookkeeping and membership have diverged; that is reported as an
    /// internal state error and the entry is retained.
    pub fn garbage_collect<F>(&mut self, in_some_range: F) -> Result<usize>
    where
        F: Fn(&str) -> bool,
    {
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !in_some_range(&entry.geohash))
            .map(|(key, _)| key.clone())
            .collect();

        let mut dropped = 0;
        for key in doomed {
            if self.entries[&key].is_in_query {
                return Err(GeoWatchError::InternalState(format!(
                    "cleanup attempted to drop key {key:?} still inside the query"
                )));
            }
            self.entries.remove(&key);
            dropped += 1;
        }
        Ok(dropped)
    }
}
