//! Spherical geometry helpers for GeoWatch
//!
//! Everything the range planner and the membership tracker need to reason
//! about circles on the Earth's surface: great-circle distance, longitude
//! wrapping, meters-to-degrees conversion, and the bit-depth calculation
//! that decides how coarse a geohash cell may be while still covering a
//! circle's bounding box.
//!
//! Distances used for membership decisions are computed on a sphere of
//! radius 6371.0 km. The meters-to-longitude-degrees conversion uses the
//! WGS84 equatorial radius and eccentricity so that east/west extents stay
//! accurate at high latitudes.

use crate::spatial::Point;
use smallvec::SmallVec;

/// Radius of the sphere used for distance computation, in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Equatorial radius of the Earth (WGS84), in meters
pub const EARTH_EQ_RADIUS_M: f64 = 6_378_137.0;

/// Meridional circumference of the Earth, in meters
pub const EARTH_MERI_CIRCUMFERENCE_M: f64 = 40_007_860.0;

/// Length of one degree of latitude, in meters
pub const METERS_PER_DEGREE_LATITUDE: f64 = 110_574.0;

/// Square of the WGS84 eccentricity
const E2: f64 = 0.006_694_478_197_99;

/// Cutoff below which a longitude span is treated as degenerate
const EPSILON: f64 = 1e-12;

/// Bits of geohash resolution per base-32 character
pub const BITS_PER_CHAR: u32 = 5;

/// Great-circle distance between two points in kilometers.
///
/// Haversine on a sphere of radius [`EARTH_RADIUS_KM`]. Symmetric, and
/// zero iff the coordinates coincide after longitude wrapping.
pub fn distance_km(a: &Point, b: &Point) -> f64 {
    let lat_delta = (b.lat - a.lat).to_radians();
    let lon_delta = wrap_longitude(b.lon - a.lon).to_radians();

    let h = (lat_delta / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (lon_delta / 2.0).sin().powi(2);

    EARTH_RADIUS_KM * 2.0 * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Reduces a longitude into [-180, 180); exactly ±180 is returned as
/// given.
pub fn wrap_longitude(longitude: f64) -> f64 {
    if (-180.0..=180.0).contains(&longitude) {
        return longitude;
    }
    let adjusted = longitude + 180.0;
    if adjusted > 0.0 {
        (adjusted % 360.0) - 180.0
    } else {
        180.0 - (-adjusted % 360.0)
    }
}

/// Number of degrees of longitude spanned by `distance_m` meters at the
/// given latitude, clamped to 360.
///
/// Near the poles a meridional arc of any positive length spans the whole
/// parallel, in which case 360 is returned.
pub fn meters_to_longitude_degrees(distance_m: f64, latitude: f64) -> f64 {
    let radians = latitude.to_radians();
    let num = radians.cos() * EARTH_EQ_RADIUS_M * std::f64::consts::PI / 180.0;
    let denom = 1.0 / (1.0 - E2 * radians.sin() * radians.sin()).sqrt();
    let meters_per_degree = num * denom;
    if meters_per_degree < EPSILON {
        if distance_m > 0.0 {
            360.0
        } else {
            0.0
        }
    } else {
        (distance_m / meters_per_degree).min(360.0)
    }
}

/// Bits of geohash necessary to reach a north-south resolution of
/// `resolution_m` meters.
pub fn latitude_bits_for_resolution(resolution_m: f64, max_bits: u32) -> f64 {
    (EARTH_MERI_CIRCUMFERENCE_M / 2.0 / resolution_m)
        .log2()
        .min(max_bits as f64)
}

/// Bits of geohash necessary to reach an east-west resolution of
/// `resolution_m` meters at the given latitude.
pub fn longitude_bits_for_resolution(resolution_m: f64, latitude: f64) -> f64 {
    let degrees = meters_to_longitude_degrees(resolution_m, latitude);
    if degrees.abs() > 1e-6 {
        (360.0 / degrees).log2().max(1.0)
    } else {
        1.0
    }
}

/// Number of leading geohash bits for which a single cell is no larger
/// than the bounding box of the circle `(center, size_m)`.
///
/// The result is clamped to `[1, BITS_PER_CHAR * precision]` so the
/// planner never asks for cells finer than the system precision.
pub fn bits_for_bounding_box(center: &Point, size_m: f64, precision: usize) -> u32 {
    let max_bits = BITS_PER_CHAR * precision as u32;
    let lat_delta_degrees = size_m / METERS_PER_DEGREE_LATITUDE;
    let latitude_north = (center.lat + lat_delta_degrees).min(90.0);
    let latitude_south = (center.lat - lat_delta_degrees).max(-90.0);

    let bits_lat = latitude_bits_for_resolution(size_m, max_bits).floor() * 2.0;
    let bits_lon_north = longitude_bits_for_resolution(size_m, latitude_north).floor() * 2.0 - 1.0;
    let bits_lon_south = longitude_bits_for_resolution(size_m, latitude_south).floor() * 2.0 - 1.0;

    let bits = bits_lat
        .min(bits_lon_north)
        .min(bits_lon_south)
        .min(max_bits as f64);
    (bits as i64).clamp(1, max_bits as i64) as u32
}

/// The corner coordinates of the axis-aligned bounding box of a circle:
/// the center row, the north row, and the south row, each at the west
/// edge, the center meridian, and the east edge.
///
/// Latitudes are clamped at the poles; longitudes wrap across the
/// antimeridian, so the caller sees corners on both sides when the box
/// crosses it. When the east/west extension spans a whole parallel (near
/// a pole), the two edge columns collapse onto the center meridian, so
/// the rows are widened to one column per quarter turn instead.
pub fn bounding_box_coordinates(center: &Point, radius_m: f64) -> SmallVec<[Point; 12]> {
    let lat_degrees = radius_m / METERS_PER_DEGREE_LATITUDE;
    let latitude_north = (center.lat + lat_degrees).min(90.0);
    let latitude_south = (center.lat - lat_degrees).max(-90.0);
    let lon_degs_north = meters_to_longitude_degrees(radius_m, latitude_north);
    let lon_degs_south = meters_to_longitude_degrees(radius_m, latitude_south);
    let lon_degs = lon_degs_north.max(lon_degs_south);

    let mut lon_offsets: SmallVec<[f64; 4]> = SmallVec::new();
    if lon_degs >= 180.0 {
        lon_offsets.extend([0.0, -90.0, 90.0, 180.0]);
    } else {
        lon_offsets.extend([0.0, -lon_degs, lon_degs]);
    }

    let mut coordinates = SmallVec::new();
    for lat in [center.lat, latitude_north, latitude_south] {
        for offset in &lon_offsets {
            coordinates.push(Point::new(lat, wrap_longitude(center.lon + offset)));
        }
    }
    coordinates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_symmetry_and_identity() {
        let a = Point::new(40.7128, -74.0060);
        let b = Point::new(51.5074, -0.1278);

        assert!((distance_km(&a, &b) - distance_km(&b, &a)).abs() < 1e-9);
        assert_eq!(distance_km(&a, &a), 0.0);
    }

    #[test]
    fn test_distance_known_values() {
        // One degree of latitude at the equator is ~111.19 km on a
        // 6371 km sphere.
        let d = distance_km(&Point::new(0.0, 0.0), &Point::new(1.0, 0.0));
        assert!((d - 111.195).abs() < 0.01);

        // Antipodal points are half the circumference apart.
        let d = distance_km(&Point::new(0.0, 0.0), &Point::new(0.0, 180.0));
        assert!((d - 20_015.09).abs() < 0.1);
    }

    #[test]
    fn test_wrap_longitude() {
        assert_eq!(wrap_longitude(0.0), 0.0);
        assert_eq!(wrap_longitude(180.0), 180.0);
        assert_eq!(wrap_longitude(-180.0), -180.0);
        assert_eq!(wrap_longitude(181.0), -179.0);
        assert_eq!(wrap_longitude(-181.0), 179.0);
        assert_eq!(wrap_longitude(540.0), -180.0);
        assert_eq!(wrap_longitude(360.0), 0.0);
        assert_eq!(wrap_longitude(-360.0), 0.0);
    }

    #[test]
    fn test_meters_to_longitude_degrees() {
        // At the equator one degree of longitude is ~111.3 km.
        let degs = meters_to_longitude_degrees(111_320.0, 0.0);
        assert!((degs - 1.0).abs() < 0.01);

        // At the poles any positive distance spans the whole parallel.
        assert_eq!(meters_to_longitude_degrees(1.0, 90.0), 360.0);
        assert_eq!(meters_to_longitude_degrees(0.0, 90.0), 0.0);

        // Result is clamped to a full circle.
        assert_eq!(meters_to_longitude_degrees(1e9, 0.0), 360.0);
    }

    #[test]
    fn test_bits_for_bounding_box() {
        let center = Point::new(1.0, 2.0);

        let bits = bits_for_bounding_box(&center, 1_000_000.0, 10);
        assert!(bits >= 1 && bits <= 50);

        // A small radius needs more bits than a large one.
        let fine = bits_for_bounding_box(&center, 100.0, 10);
        let coarse = bits_for_bounding_box(&center, 1_000_000.0, 10);
        assert!(fine > coarse);

        // Clamped at the precision ceiling and the floor.
        assert_eq!(bits_for_bounding_box(&center, 0.5, 10), 50);
        assert_eq!(bits_for_bounding_box(&center, 1e9, 10), 1);
    }

    #[test]
    fn test_bounding_box_coordinates() {
        let center = Point::new(1.0, 2.0);
        let coords = bounding_box_coordinates(&center, 1_000_000.0);
        assert_eq!(coords.len(), 9);

        // The box extends ~9 degrees of latitude each way.
        let north = coords.iter().map(|p| p.lat).fold(f64::MIN, f64::max);
        let south = coords.iter().map(|p| p.lat).fold(f64::MAX, f64::min);
        assert!((north - 10.04).abs() < 0.05);
        assert!((south + 8.04).abs() < 0.05);
    }

    #[test]
    fn test_bounding_box_coordinates_wraps_antimeridian() {
        let center = Point::new(0.0, 179.5);
        let coords = bounding_box_coordinates(&center, 200_000.0);

        // Some corners must land on the western side of the antimeridian.
        assert!(coords.iter().any(|p| p.lon < 0.0));
        assert!(coords.iter().all(|p| (-180.0..=180.0).contains(&p.lon)));
    }

    #[test]
    fn test_bounding_box_coordinates_clamps_poles() {
        let coords = bounding_box_coordinates(&Point::new(89.9, 0.0), 100_000.0);
        assert!(coords.iter().all(|p| p.lat <= 90.0));
        assert!(coords.iter().any(|p| p.lat == 90.0));

        // The cap wraps a whole parallel, so both hemispheres of
        // longitude must be represented.
        assert_eq!(coords.len(), 12);
        assert!(coords.iter().any(|p| p.lon > 0.0));
        assert!(coords.iter().any(|p| p.lon < 0.0));
    }
}
