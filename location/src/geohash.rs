/// Geohash length used as the shard key.
///
/// A 5-character cell is roughly 4.9km x 4.9km at the equator: small enough
/// that a shard's similarity index is cheap to build, large enough that
/// venue-scale duplicates almost never straddle two cells.
pub const GEOHASH_PRECISION: usize = 5;

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Encode a coordinate into a geohash of `precision` characters.
///
/// Bits alternate between longitude and latitude, longitude first.
/// Out-of-range input is clamped to the valid coordinate space.
pub fn encode(lon: f64, lat: f64, precision: usize) -> String {
    let lon = lon.clamp(-180.0, 180.0);
    let lat = lat.clamp(-90.0, 90.0);

    let (mut lon_lo, mut lon_hi) = (-180.0_f64, 180.0_f64);
    let (mut lat_lo, mut lat_hi) = (-90.0_f64, 90.0_f64);

    let mut out = String::with_capacity(precision);
    let mut even = true;
    let mut bits = 0u8;
    let mut n = 0;

    while out.len() < precision {
        let (lo, hi, v) = if even {
            (&mut lon_lo, &mut lon_hi, lon)
        } else {
            (&mut lat_lo, &mut lat_hi, lat)
        };
        let mid = (*lo + *hi) / 2.0;
        bits <<= 1;
        if v >= mid {
            bits |= 1;
            *lo = mid;
        } else {
            *hi = mid;
        }
        even = !even;
        n += 1;
        if n == 5 {
            out.push(BASE32[bits as usize] as char);
            bits = 0;
            n = 0;
        }
    }
    out
}

/// Report whether `hash` is a well-formed shard key.
pub fn is_valid(hash: &str) -> bool {
    hash.len() == GEOHASH_PRECISION && hash.bytes().all(|c| BASE32.contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(encode(-5.6, 42.6, 5), "ezs42");
        assert_eq!(encode(-73.60033, 45.524115, 5), "f25dv");
        assert_eq!(encode(-73.60033, 45.524115, 9), "f25dvpmvh");
        assert_eq!(encode(0.0, 0.0, 5), "s0000");
    }

    #[test]
    fn test_corners() {
        assert_eq!(encode(180.0, 90.0, 5), "zzzzz");
        assert_eq!(encode(-180.0, -90.0, 5), "00000");
    }

    #[test]
    fn test_clamps_out_of_range() {
        assert_eq!(encode(200.0, 100.0, 5), encode(180.0, 90.0, 5));
    }

    #[test]
    fn test_is_valid() {
        assert!(is_valid("f25dv"));
        assert!(!is_valid("f25d"));
        assert!(!is_valid("f25di"));
        assert!(!is_valid("F25DV"));
        assert!(!is_valid("f25dvp"));
    }
}
