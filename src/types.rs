//! Types and configuration for GeoWatch
//!
//! This module provides the serializable configuration, the query
//! criteria type, and the key validation rules shared by the façade and
//! the query engine.

use crate::error::{GeoWatchError, Result};
use crate::geohash::MAX_PRECISION;
use crate::spatial::Point;
use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default geohash precision for stored records (~60 cm cells)
pub const DEFAULT_GEOHASH_PRECISION: usize = 10;

/// Largest accepted query radius: half the equatorial circumference
pub const MAX_QUERY_RADIUS_KM: f64 = 20_037.5;

/// Longest accepted key, in bytes
const MAX_KEY_BYTES: usize = 768;

/// Characters that may not appear in keys
const FORBIDDEN_KEY_CHARS: &[char] = &['.', '$', '#', '[', ']', '/'];

/// Engine configuration
///
/// This configuration is designed to be easily serializable and loadable
/// from JSON or TOML while keeping complexity minimal. The cleanup
/// thresholds are policy knobs; the defaults match the reference
/// behavior of the system.
///
/// # Example
///
/// ```rust
/// use geowatch::Config;
///
/// let json = r#"{
///     "geohash_precision": 12,
///     "max_idle_ranges": 50
/// }"#;
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.geohash_precision, 12);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Geohash precision for stored records (1-22, default: 10)
    #[serde(default = "Config::default_geohash_precision")]
    pub geohash_precision: usize,

    /// Number of range subscriptions a query may hold before a debounced
    /// teardown of inactive ranges is scheduled (default: 25)
    #[serde(default = "Config::default_max_idle_ranges")]
    pub max_idle_ranges: usize,

    /// Debounce before tearing down inactive ranges, in milliseconds
    /// (default: 10)
    #[serde(default = "Config::default_cleanup_debounce_ms")]
    pub cleanup_debounce_ms: u64,

    /// Interval of the periodic range sweep, in seconds (default: 10)
    #[serde(default = "Config::default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Config {
    const fn default_geohash_precision() -> usize {
        DEFAULT_GEOHASH_PRECISION
    }

    const fn default_max_idle_ranges() -> usize {
        25
    }

    const fn default_cleanup_debounce_ms() -> u64 {
        10
    }

    const fn default_sweep_interval_secs() -> u64 {
        10
    }

    /// Create a configuration with custom geohash precision
    pub fn with_geohash_precision(precision: usize) -> Self {
        assert!(
            (1..=MAX_PRECISION).contains(&precision),
            "Geohash precision must be between 1 and {MAX_PRECISION}"
        );

        Self {
            geohash_precision: precision,
            ..Self::default()
        }
    }

    /// Set the idle-range threshold
    pub fn with_max_idle_ranges(mut self, ranges: usize) -> Self {
        self.max_idle_ranges = ranges;
        self
    }

    /// Set the teardown debounce
    pub fn with_cleanup_debounce(mut self, debounce: Duration) -> Self {
        self.cleanup_debounce_ms = debounce.as_millis() as u64;
        self
    }

    /// Set the periodic sweep interval
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_secs = interval.as_secs();
        self
    }

    /// Teardown debounce as a Duration
    pub fn cleanup_debounce(&self) -> Duration {
        Duration::from_millis(self.cleanup_debounce_ms)
    }

    /// Periodic sweep interval as a Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.geohash_precision < 1 || self.geohash_precision > MAX_PRECISION {
            return Err(format!(
                "Geohash precision must be between 1 and {MAX_PRECISION}"
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err("Sweep interval must be at least one second".to_string());
        }
        Ok(())
    }

    /// Load configuration from JSON string
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as JSON string
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load configuration from TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> std::result::Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            geohash_precision: Self::default_geohash_precision(),
            max_idle_ranges: Self::default_max_idle_ranges(),
            cleanup_debounce_ms: Self::default_cleanup_debounce_ms(),
            sweep_interval_secs: Self::default_sweep_interval_secs(),
        }
    }
}

/// Criteria of a live query: a center point and a radius in kilometers.
///
/// Both fields are required when creating a query; updates may carry
/// either or both, and an absent field preserves the current value.
/// Unknown fields are rejected when deserializing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryCriteria {
    /// Center of the circular region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<Point>,
    /// Radius of the circular region, in kilometers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius_km: Option<f64>,
}

impl QueryCriteria {
    /// Criteria with both fields set
    pub fn new(center: Point, radius_km: f64) -> Self {
        Self {
            center: Some(center),
            radius_km: Some(radius_km),
        }
    }

    /// Criteria updating only the center
    pub fn from_center(center: Point) -> Self {
        Self {
            center: Some(center),
            radius_km: None,
        }
    }

    /// Criteria updating only the radius
    pub fn from_radius(radius_km: f64) -> Self {
        Self {
            center: None,
            radius_km: Some(radius_km),
        }
    }

    /// Validate the criteria.
    ///
    /// With `require_center_and_radius` both fields must be present
    /// (query construction); otherwise at least one must be (updates).
    pub fn validate(&self, require_center_and_radius: bool) -> Result<()> {
        if require_center_and_radius && (self.center.is_none() || self.radius_km.is_none()) {
            return Err(GeoWatchError::InvalidCriteria(
                "both center and radius are required".to_string(),
            ));
        }
        if self.center.is_none() && self.radius_km.is_none() {
            return Err(GeoWatchError::InvalidCriteria(
                "criteria must carry a center or a radius".to_string(),
            ));
        }
        if let Some(center) = &self.center {
            center.validate()?;
        }
        if let Some(radius) = self.radius_km {
            if !radius.is_finite() {
                return Err(GeoWatchError::InvalidCriteria(format!(
                    "radius must be a finite number, got {radius}"
                )));
            }
            if radius <= 0.0 {
                return Err(GeoWatchError::InvalidCriteria(format!(
                    "radius must be greater than zero, got {radius}"
                )));
            }
            if radius > MAX_QUERY_RADIUS_KM {
                return Err(GeoWatchError::InvalidCriteria(format!(
                    "radius must not exceed {MAX_QUERY_RADIUS_KM} km, got {radius}"
                )));
            }
        }
        Ok(())
    }
}

/// Checks that a string is a valid record key: non-empty, at most 768
/// bytes, printable, and free of `. $ # [ ] /`.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(GeoWatchError::InvalidKey(
            "key must not be empty".to_string(),
        ));
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(GeoWatchError::InvalidKey(format!(
            "key length {} exceeds the maximum of {MAX_KEY_BYTES} bytes",
            key.len()
        )));
    }
    for c in key.chars() {
        if c.is_control() {
            return Err(GeoWatchError::InvalidKey(format!(
                "key must not contain control characters, got {c:?}"
            )));
        }
        if FORBIDDEN_KEY_CHARS.contains(&c) {
            return Err(GeoWatchError::InvalidKey(format!(
                "key must not contain {c:?}"
            )));
        }
    }
    Ok(())
}
