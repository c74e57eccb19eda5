//! # GeoWatch - realtime geospatial queries
//!
//! GeoWatch maps short string keys to points on the Earth's surface and
//! lets clients subscribe to a moving circular region, receiving a
//! continuous stream of membership events as points are inserted,
//! updated, moved, or removed anywhere in the underlying store.
//!
//! ## Core Features
//!
//! - **Live radius queries** with `key_entered` / `key_exited` /
//!   `key_moved` / `ready` events
//! - **Geohash range planning** that prunes the store down to a handful
//!   of ordered prefix ranges per query
//! - **Moving queries**: update the center or radius on the fly without
//!   dropping or double-firing events
//! - **Deferred subscription teardown** so panning queries don't thrash
//!   the store
//! - **Pluggable realtime store** behind a small trait, with an
//!   in-memory implementation included
//!
//! ## Quick Start
//!
//! ```rust
//! use geowatch::{GeoWatch, Point, QueryCriteria};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let geo = GeoWatch::memory();
//!
//! // A live query over everything within 1000 km of (1, 2).
//! let query = geo.query(QueryCriteria::new(Point::new(1.0, 2.0), 1000.0))?;
//! query.on_key_entered(|key, location, distance_km| {
//!     println!("{key} entered at {location} ({distance_km:.1} km away)");
//! });
//! query.on_ready(|| println!("initial data loaded"));
//!
//! // Writes anywhere in the store flow into matching queries.
//! geo.set("truck-17", Point::new(2.0, 3.0))?;
//! geo.set("truck-18", Point::new(50.0, -7.0))?; // outside, no event
//!
//! // Move the circle; membership updates fire synchronously.
//! query.update_criteria(QueryCriteria::from_center(Point::new(50.0, -7.0)))?;
//!
//! query.cancel();
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Geohash Precision
//!
//! ```rust
//! use geowatch::{Config, GeoWatch, MemoryStore};
//! use std::sync::Arc;
//!
//! // Precision 10 (the default) gives ~60 cm cells; lower is coarser.
//! let store = Arc::new(MemoryStore::new());
//! let geo = GeoWatch::with_config(store, Config::with_geohash_precision(8));
//! ```

pub mod db;
pub mod error;
pub mod geohash;
pub mod geometry;
pub mod query;
pub mod ranges;
pub mod spatial;
pub mod store;
pub mod types;

mod subscription;
mod tracker;

// Core exports - Main API
pub use db::GeoWatch;
pub use error::{GeoWatchError, Result};
pub use query::{
    CallbackRegistration, EventType, GeoQuery, KeyEventCallback, KeyExitCallback, ReadyCallback,
};

// Spatial types and operations
pub use ranges::GeohashRange;
pub use spatial::{BoundingBox, Point};

// Configuration and criteria
pub use types::{Config, QueryCriteria, DEFAULT_GEOHASH_PRECISION, MAX_QUERY_RADIUS_KM};

// Store abstraction
pub use store::{ListenerHandle, MemoryStore, RealtimeStore, StoreStats, StoredRecord};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
///
/// ```rust
/// use geowatch::prelude::*;
///
/// # fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
/// let geo = GeoWatch::memory();
/// let query = geo.query(QueryCriteria::new(Point::new(1.0, 2.0), 100.0))?;
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    // Core types
    pub use crate::{GeoQuery, GeoWatch, GeoWatchError, Result};

    // Spatial types
    pub use crate::{GeohashRange, Point};

    // Configuration
    pub use crate::{Config, QueryCriteria};

    // Store abstraction
    pub use crate::{MemoryStore, RealtimeStore};
}
