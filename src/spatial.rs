//! Spatial types for GeoWatch
//!
//! This module provides the geographic primitives used throughout the
//! crate:
//!
//! - `Point` for latitude/longitude coordinates with validation
//! - `BoundingBox` for axis-aligned regions on the sphere
//! - Interop with the `geo` crate for geometric operations
//!
//! # Examples
//!
//! ```rust
//! use geowatch::Point;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let nyc = Point::new(40.7128, -74.0060);
//! let london = Point::new(51.5074, -0.1278);
//!
//! let distance_km = nyc.distance_to(&london) / 1000.0;
//! println!("NYC to London: {:.0} km", distance_km);
//! # Ok(())
//! # }
//! ```

use crate::error::{GeoWatchError, Result};
use crate::geometry;
use geo::{Coord, Point as GeoPoint};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A geographic point representing a location on Earth's surface.
///
/// `Point` stores latitude and longitude coordinates in the WGS84
/// coordinate reference system (EPSG:4326).
///
/// # Coordinate System
///
/// - **Latitude**: North-South position (-90° to +90°)
/// - **Longitude**: East-West position (-180° to +180°)
///
/// # Examples
///
/// ```rust
/// use geowatch::Point;
///
/// let new_york = Point::new(40.7128, -74.0060);
/// let sydney = Point::new(-33.8568, 151.2153);
///
/// let distance_km = new_york.distance_to(&sydney) / 1000.0;
/// assert!(distance_km > 15_000.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Latitude in decimal degrees (-90.0 to +90.0)
    pub lat: f64,
    /// Longitude in decimal degrees (-180.0 to +180.0)
    pub lon: f64,
}

impl Point {
    /// Creates a new point from latitude and longitude coordinates.
    ///
    /// This method does not validate coordinate ranges; use
    /// [`Point::validate`] before handing a point to the query engine.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Checks that both coordinates are finite and within range.
    ///
    /// # Errors
    ///
    /// Returns `GeoWatchError::InvalidLocation` if either coordinate is
    /// NaN or infinite, latitude is outside [-90, 90], or longitude is
    /// outside [-180, 180].
    pub fn validate(&self) -> Result<()> {
        if !self.lat.is_finite() || !self.lon.is_finite() {
            return Err(GeoWatchError::InvalidLocation(format!(
                "coordinates must be finite numbers, got ({}, {})",
                self.lat, self.lon
            )));
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(GeoWatchError::InvalidLocation(format!(
                "latitude must be within [-90, 90], got {}",
                self.lat
            )));
        }
        if !(-180.0..=180.0).contains(&self.lon) {
            return Err(GeoWatchError::InvalidLocation(format!(
                "longitude must be within [-180, 180], got {}",
                self.lon
            )));
        }
        Ok(())
    }

    /// Creates a point from a `geo::Point`.
    ///
    /// Note that `geo` orders coordinates (x, y) = (lon, lat).
    pub fn from_geo_point(point: GeoPoint<f64>) -> Self {
        Self {
            lat: point.y(),
            lon: point.x(),
        }
    }

    /// Convert to geo::Point
    pub fn to_geo_point(&self) -> GeoPoint<f64> {
        GeoPoint::new(self.lon, self.lat)
    }

    /// Convert to geo::Coord
    pub fn to_coordinate(&self) -> Coord<f64> {
        Coord {
            x: self.lon,
            y: self.lat,
        }
    }

    /// Calculates the great-circle distance to another point in meters.
    ///
    /// Uses the haversine formula on a sphere of radius 6371.0 km, which
    /// is the radius the query engine uses for all membership decisions.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use geowatch::Point;
    ///
    /// let new_york = Point::new(40.7128, -74.0060);
    /// let los_angeles = Point::new(34.0522, -118.2437);
    ///
    /// let distance_km = new_york.distance_to(&los_angeles) / 1000.0;
    /// assert!(distance_km > 3_900.0 && distance_km < 4_000.0);
    /// ```
    pub fn distance_to(&self, other: &Point) -> f64 {
        geometry::distance_km(self, other) * 1000.0
    }

    /// Check if the point lies within a lat/lon rectangle
    pub fn within_bounds(&self, min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> bool {
        self.lat >= min_lat && self.lat <= max_lat && self.lon >= min_lon && self.lon <= max_lon
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}

/// A bounding box defined by two points
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub min: Point,
    pub max: Point,
}

impl BoundingBox {
    /// Create a new bounding box
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min: Point::new(min_lat, min_lon),
            max: Point::new(max_lat, max_lon),
        }
    }

    /// Create a bounding box from two points
    pub fn from_points(p1: Point, p2: Point) -> Self {
        Self::new(
            p1.lat.min(p2.lat),
            p1.lon.min(p2.lon),
            p1.lat.max(p2.lat),
            p1.lon.max(p2.lon),
        )
    }

    /// Check if a point is contained within this bounding box
    pub fn contains(&self, point: &Point) -> bool {
        point.within_bounds(self.min.lat, self.min.lon, self.max.lat, self.max.lon)
    }

    /// Center of the box
    pub fn center(&self) -> Point {
        Point::new(
            (self.min.lat + self.max.lat) / 2.0,
            (self.min.lon + self.max.lon) / 2.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_creation() {
        let point = Point::new(40.7128, -74.0060);
        assert_eq!(point.lat, 40.7128);
        assert_eq!(point.lon, -74.0060);
    }

    #[test]
    fn test_point_validation() {
        assert!(Point::new(40.7128, -74.0060).validate().is_ok());
        assert!(Point::new(90.0, 180.0).validate().is_ok());
        assert!(Point::new(-90.0, -180.0).validate().is_ok());

        assert!(Point::new(90.1, 0.0).validate().is_err());
        assert!(Point::new(0.0, 180.1).validate().is_err());
        assert!(Point::new(f64::NAN, 0.0).validate().is_err());
        assert!(Point::new(0.0, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn test_distance_calculation() {
        let nyc = Point::new(40.7128, -74.0060);
        let la = Point::new(34.0522, -118.2437);
        let distance = nyc.distance_to(&la);

        // Distance between NYC and LA should be roughly 3,936 km
        assert!(distance > 3_900_000.0 && distance < 4_000_000.0);

        // Distance to self is zero
        assert!(nyc.distance_to(&nyc) < 1e-6);
    }

    #[test]
    fn test_distance_matches_geo_crate() {
        use geo::algorithm::Distance;
        use geo::Haversine;

        let nyc = Point::new(40.7128, -74.0060);
        let london = Point::new(51.5074, -0.1278);

        let ours = nyc.distance_to(&london);
        let geo_crate = Haversine.distance(nyc.to_geo_point(), london.to_geo_point());

        // geo uses the IUGG mean radius (6371.0088 km) while the query
        // engine uses 6371.0 exactly, so allow a small relative error.
        let relative = (ours - geo_crate).abs() / geo_crate;
        assert!(relative < 1e-4, "relative error {relative}");
    }

    #[test]
    fn test_geo_interop() {
        let point = Point::new(40.7128, -74.0060);
        let geo_point = point.to_geo_point();
        assert_eq!(geo_point.x(), -74.0060);
        assert_eq!(geo_point.y(), 40.7128);

        let back = Point::from_geo_point(geo_point);
        assert_eq!(back, point);

        let coord = point.to_coordinate();
        assert_eq!(coord.x, -74.0060);
        assert_eq!(coord.y, 40.7128);
    }

    #[test]
    fn test_bounding_box() {
        let bbox = BoundingBox::new(40.0, -75.0, 41.0, -73.0);
        assert!(bbox.contains(&Point::new(40.5, -74.0)));
        assert!(!bbox.contains(&Point::new(42.0, -74.0)));

        let from_points = BoundingBox::from_points(Point::new(41.0, -75.0), Point::new(40.0, -73.0));
        assert_eq!(from_points, bbox);

        let center = bbox.center();
        assert!((center.lat - 40.5).abs() < 1e-12);
        assert!((center.lon + 74.0).abs() < 1e-12);
    }
}
