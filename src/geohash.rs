//! Base-32 geohash codec
//!
//! Standard interleaved latitude/longitude bit encoding into the alphabet
//! `0123456789bcdefghjkmnpqrstuvwxyz`. Longer strings denote smaller
//! cells; lexicographic order on strings approximates spatial proximity
//! along the encoding's space-filling curve, which is what lets the range
//! planner turn circles into string ranges.
//!
//! Precision is capped at 22 characters (110 bits), well past the point
//! where cells are smaller than f64 coordinate resolution.

use crate::error::{GeoWatchError, Result};
use crate::spatial::{BoundingBox, Point};
use once_cell::sync::Lazy;

/// The geohash base-32 alphabet, in code order
pub const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Maximum supported geohash length, in characters
pub const MAX_PRECISION: usize = 22;

/// Reverse lookup from ASCII byte to base-32 code, -1 for invalid bytes
static BASE32_POSITIONS: Lazy<[i8; 128]> = Lazy::new(|| {
    let mut table = [-1i8; 128];
    for (value, &byte) in BASE32.iter().enumerate() {
        table[byte as usize] = value as i8;
    }
    table
});

fn char_value(c: char) -> Option<u8> {
    if (c as u32) < 128 {
        let v = BASE32_POSITIONS[c as usize];
        (v >= 0).then_some(v as u8)
    } else {
        None
    }
}

/// Checks that a string is a well-formed geohash: non-empty, no longer
/// than [`MAX_PRECISION`], and drawn entirely from the base-32 alphabet.
pub fn validate_geohash(hash: &str) -> Result<()> {
    if hash.is_empty() {
        return Err(GeoWatchError::InvalidGeohash(
            "geohash must not be empty".to_string(),
        ));
    }
    if hash.len() > MAX_PRECISION {
        return Err(GeoWatchError::InvalidGeohash(format!(
            "geohash length {} exceeds the maximum of {}",
            hash.len(),
            MAX_PRECISION
        )));
    }
    for c in hash.chars() {
        if char_value(c).is_none() {
            return Err(GeoWatchError::InvalidGeohash(format!(
                "invalid geohash character {c:?}"
            )));
        }
    }
    Ok(())
}

/// Encodes a location as a geohash of exactly `precision` characters.
///
/// Deterministic: two locations in the same cell at a given precision
/// produce identical strings.
///
/// # Errors
///
/// Returns `GeoWatchError::InvalidLocation` for out-of-range coordinates
/// and `GeoWatchError::InvalidGeohash` for a precision of 0 or above
/// [`MAX_PRECISION`].
pub fn encode(location: &Point, precision: usize) -> Result<String> {
    location.validate()?;
    if precision == 0 || precision > MAX_PRECISION {
        return Err(GeoWatchError::InvalidGeohash(format!(
            "precision must be within [1, {MAX_PRECISION}], got {precision}"
        )));
    }

    let mut out = String::with_capacity(precision);
    let (mut min_lat, mut max_lat) = (-90.0f64, 90.0f64);
    let (mut min_lon, mut max_lon) = (-180.0f64, 180.0f64);
    let mut hash_value: usize = 0;
    let mut bits: u32 = 0;
    let mut even_bit = true;

    while out.len() < precision {
        if even_bit {
            let mid = (min_lon + max_lon) / 2.0;
            if location.lon > mid {
                hash_value = (hash_value << 1) + 1;
                min_lon = mid;
            } else {
                hash_value <<= 1;
                max_lon = mid;
            }
        } else {
            let mid = (min_lat + max_lat) / 2.0;
            if location.lat > mid {
                hash_value = (hash_value << 1) + 1;
                min_lat = mid;
            } else {
                hash_value <<= 1;
                max_lat = mid;
            }
        }
        even_bit = !even_bit;
        bits += 1;

        if bits == 5 {
            out.push(BASE32[hash_value] as char);
            bits = 0;
            hash_value = 0;
        }
    }
    Ok(out)
}

/// Decodes a geohash prefix into the bounding box of its cell.
pub fn cell_bounds(hash: &str) -> Result<BoundingBox> {
    validate_geohash(hash)?;

    let (mut min_lat, mut max_lat) = (-90.0f64, 90.0f64);
    let (mut min_lon, mut max_lon) = (-180.0f64, 180.0f64);
    let mut even_bit = true;

    for c in hash.chars() {
        // validate_geohash guarantees membership
        let value = char_value(c).ok_or_else(|| {
            GeoWatchError::InvalidGeohash(format!("invalid geohash character {c:?}"))
        })?;
        for shift in (0..5).rev() {
            let bit = (value >> shift) & 1;
            if even_bit {
                let mid = (min_lon + max_lon) / 2.0;
                if bit == 1 {
                    min_lon = mid;
                } else {
                    max_lon = mid;
                }
            } else {
                let mid = (min_lat + max_lat) / 2.0;
                if bit == 1 {
                    min_lat = mid;
                } else {
                    max_lat = mid;
                }
            }
            even_bit = !even_bit;
        }
    }

    Ok(BoundingBox::new(min_lat, min_lon, max_lat, max_lon))
}
