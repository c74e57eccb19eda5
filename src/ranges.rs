//! Range planner
//!
//! Turns a circle on the sphere into a small set of lexicographic geohash
//! ranges that cover the circle's bounding box. The ranges are coarse by
//! construction (false positives are expected); the membership tracker
//! rejects anything outside the true radius.

use crate::error::Result;
use crate::geohash;
use crate::geometry::{self, BITS_PER_CHAR};
use crate::spatial::Point;

/// Sentinel appended to a prefix to form its upper bound. ASCII `~` sorts
/// after every base-32 geohash character, so `prefix..=prefix + "~"`
/// captures every string starting with `prefix`.
const RANGE_SENTINEL: char = '~';

/// An inclusive lexicographic range of geohash strings.
///
/// A stored geohash matches iff `start <= hash <= end`. Ranges are what
/// the subscription manager opens against the datastore's ordered-child
/// index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeohashRange {
    /// Inclusive lower bound
    pub start: String,
    /// Inclusive upper bound
    pub end: String,
}

impl GeohashRange {
    /// Create a range from its bounds.
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Whether a geohash sorts within this range.
    pub fn contains(&self, hash: &str) -> bool {
        self.start.as_str() <= hash && hash <= self.end.as_str()
    }
}

impl std::fmt::Display for GeohashRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// The range of stored geohashes that shares the first `bits` bits of
/// `hash`.
///
/// The hash is truncated to `ceil(bits / 5)` characters; the partial
/// trailing character is widened to the enclosing block of cells by
/// masking off its unused low bits.
pub fn range_for_hash(hash: &str, bits: u32) -> GeohashRange {
    let precision = bits.div_ceil(BITS_PER_CHAR) as usize;
    if hash.len() < precision {
        return GeohashRange::new(hash, format!("{hash}{RANGE_SENTINEL}"));
    }

    let hash = &hash[..precision];
    let base = &hash[..hash.len() - 1];
    let last = hash.as_bytes()[hash.len() - 1];
    let last_value = geohash::BASE32
        .iter()
        .position(|&b| b == last)
        .unwrap_or(0) as u32;

    let significant_bits = bits - base.len() as u32 * BITS_PER_CHAR;
    let unused_bits = BITS_PER_CHAR - significant_bits;
    let start_value = (last_value >> unused_bits) << unused_bits;
    let end_value = start_value + (1 << unused_bits);

    let start = format!("{base}{}", geohash::BASE32[start_value as usize] as char);
    let end = if end_value > 31 {
        format!("{base}{RANGE_SENTINEL}")
    } else {
        format!("{base}{}", geohash::BASE32[end_value as usize] as char)
    };
    GeohashRange::new(start, end)
}

/// Plans the set of geohash ranges covering the circle
/// `(center, radius_m)`, for stored geohashes of length `precision`.
///
/// The corners of the circle's bounding box are encoded and widened to
/// bit-aligned ranges, then sorted, merged where they overlap or touch,
/// and deduplicated. Every point within the radius encodes into at least
/// one returned range; points outside may as well.
pub fn ranges_for_circle(center: &Point, radius_m: f64, precision: usize) -> Result<Vec<GeohashRange>> {
    let bits = geometry::bits_for_bounding_box(center, radius_m, precision);
    let range_precision = bits.div_ceil(BITS_PER_CHAR) as usize;

    let coordinates = geometry::bounding_box_coordinates(center, radius_m);
    let mut ranges = Vec::with_capacity(coordinates.len());
    for coordinate in &coordinates {
        let hash = geohash::encode(coordinate, range_precision)?;
        ranges.push(range_for_hash(&hash, bits));
    }

    ranges.sort();
    ranges.dedup();

    // Merge ranges that overlap or touch; the union covers the same set.
    let mut merged: Vec<GeohashRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => {
                if range.end > last.end {
                    last.end = range.end;
                }
            }
            _ => merged.push(range),
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::distance_km;

    #[test]
    fn test_range_contains() {
        let range = GeohashRange::new("d0", "d8");
        assert!(range.contains("d0"));
        assert!(range.contains("d5xyz"));
        assert!(range.contains("d7zzzzzzzz"));
        assert!(range.contains("d8"));
        assert!(!range.contains("d9"));
        assert!(!range.contains("czzz"));
    }

    #[test]
    fn test_range_for_hash_full_char_bits() {
        // 10 bits = exactly two characters; the range is one cell wide.
        let range = range_for_hash("d2ab", 10);
        assert_eq!(range.start, "d2");
        assert_eq!(range.end, "d3");
    }

    #[test]
    fn test_range_for_hash_partial_char_bits() {
        // 8 bits into a 2-char prefix: 3 significant bits in the second
        // character, so the range spans a block of 4 cells.
        let range = range_for_hash("d5", 8);
        let start_value = geohash::BASE32.iter().position(|&b| b == range.start.as_bytes()[1]).unwrap();
        let end_value = geohash::BASE32.iter().position(|&b| b == range.end.as_bytes()[1]).unwrap();
        assert_eq!(range.start.len(), 2);
        assert_eq!(end_value - start_value, 4);
        assert!(range.contains("d5"));
    }

    #[test]
    fn test_range_for_hash_top_of_alphabet() {
        // A block ending past 'z' closes with the sentinel.
        let range = range_for_hash("dz", 8);
        assert_eq!(range.end, "d~");
        assert!(range.contains("dzzzzz"));
    }

    #[test]
    fn test_range_for_hash_short_hash() {
        let range = range_for_hash("d", 10);
        assert_eq!(range.start, "d");
        assert_eq!(range.end, "d~");
    }

    #[test]
    fn test_ranges_for_circle_dedupes_and_sorts() {
        let ranges = ranges_for_circle(&Point::new(1.0, 2.0), 1_000_000.0, 10).unwrap();
        assert!(!ranges.is_empty());
        for window in ranges.windows(2) {
            assert!(window[0].end < window[1].start, "{} vs {}", window[0], window[1]);
        }
    }

    #[test]
    fn test_ranges_cover_points_inside_circle() {
        let center = Point::new(37.7749, -122.4194);
        let radius_m = 50_000.0;
        let ranges = ranges_for_circle(&center, radius_m, 10).unwrap();

        // March a grid across the circle; every interior point's geohash
        // must land in some range.
        let mut lat = center.lat - 0.4;
        while lat < center.lat + 0.4 {
            let mut lon = center.lon - 0.5;
            while lon < center.lon + 0.5 {
                let p = Point::new(lat, lon);
                if distance_km(&center, &p) * 1000.0 <= radius_m {
                    let hash = geohash::encode(&p, 10).unwrap();
                    assert!(
                        ranges.iter().any(|r| r.contains(&hash)),
                        "uncovered point {p} hash {hash}"
                    );
                }
                lon += 0.02;
            }
            lat += 0.02;
        }
    }

    #[test]
    fn test_ranges_for_circle_antimeridian() {
        let center = Point::new(0.0, 179.9);
        let ranges = ranges_for_circle(&center, 100_000.0, 10).unwrap();

        // Points just east and west of the antimeridian are both covered.
        for lon in [179.95, -179.95] {
            let hash = geohash::encode(&Point::new(0.0, lon), 10).unwrap();
            assert!(ranges.iter().any(|r| r.contains(&hash)), "lon {lon}");
        }
    }

    #[test]
    fn test_ranges_for_circle_polar() {
        let center = Point::new(89.5, 0.0);
        let ranges = ranges_for_circle(&center, 200_000.0, 10).unwrap();
        let hash = geohash::encode(&Point::new(90.0, 120.0), 10).unwrap();
        // The whole polar cap parallels are spanned.
        assert!(ranges.iter().any(|r| r.contains(&hash)));
    }
}
