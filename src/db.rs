//! GeoWatch façade
//!
//! The thin writer/reader surface over the realtime store, plus the
//! entry point for live queries. All of the interesting state lives in
//! the queries; the façade validates input, encodes the geohash, and
//! writes the `{g, l}` record atomically.

use crate::error::Result;
use crate::geohash;
use crate::query::GeoQuery;
use crate::spatial::Point;
use crate::store::{MemoryStore, RealtimeStore, StoredRecord};
use crate::types::{validate_key, Config, QueryCriteria};
use std::sync::Arc;
use tracing::debug;

/// Maps keys to locations in a realtime store and creates live queries
/// over them.
///
/// `GeoWatch` is cheap to clone; clones share the same store handle.
/// Queries created from it are independent of each other and of this
/// handle — dropping the façade does not cancel them.
///
/// # Examples
///
/// ```rust
/// use geowatch::{GeoWatch, Point, QueryCriteria};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let geo = GeoWatch::memory();
///
/// geo.set("rider-1", Point::new(37.7853, -122.4005))?;
/// assert!(geo.get("rider-1")?.is_some());
///
/// let query = geo.query(QueryCriteria::new(
///     Point::new(37.7749, -122.4194),
///     5.0,
/// ))?;
/// query.on_key_entered(|key, _location, distance_km| {
///     println!("{key} is {distance_km:.2} km away");
/// });
///
/// geo.remove("rider-1")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct GeoWatch {
    store: Arc<dyn RealtimeStore>,
    config: Config,
}

impl GeoWatch {
    /// Create a façade over an in-memory store with the default
    /// configuration.
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Create a façade over an existing store.
    pub fn new(store: Arc<dyn RealtimeStore>) -> Self {
        Self::with_config(store, Config::default())
    }

    /// Create a façade with a custom configuration.
    ///
    /// The configuration's geohash precision governs every record this
    /// façade writes and every query it creates.
    pub fn with_config(store: Arc<dyn RealtimeStore>, config: Config) -> Self {
        Self { store, config }
    }

    /// The configuration in effect.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying store handle.
    pub fn store(&self) -> &Arc<dyn RealtimeStore> {
        &self.store
    }

    /// Write a key's location, replacing any previous one.
    ///
    /// The geohash and the coordinates are written as one atomic
    /// record.
    pub fn set(&self, key: &str, location: Point) -> Result<()> {
        validate_key(key)?;
        location.validate()?;
        let g = geohash::encode(&location, self.config.geohash_precision)?;
        debug!(key, %location, g, "set location");
        self.store.put(key, StoredRecord::new(g, &location))
    }

    /// Read a key's current location.
    pub fn get(&self, key: &str) -> Result<Option<Point>> {
        validate_key(key)?;
        Ok(self.store.get(key)?.map(|record| record.location()))
    }

    /// Delete a key; absent keys are a no-op.
    pub fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        debug!(key, "remove location");
        self.store.remove(key)
    }

    /// Open a live query over a circular region.
    ///
    /// Both the center and the radius are required.
    pub fn query(&self, criteria: QueryCriteria) -> Result<GeoQuery> {
        GeoQuery::create(self.store.clone(), self.config.clone(), criteria)
    }
}
