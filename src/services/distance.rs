//! Great-circle distance (haversine)

use crate::domain::types::Coordinate;

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two coordinates in kilometres
#[inline]
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Clamp guards sqrt(1 - h) against rounding just above 1 for antipodes
    let h = h.clamp(0.0, 1.0);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Distance rounded to whole metres, as displayed to users
#[inline]
pub fn distance_m(a: Coordinate, b: Coordinate) -> u64 {
    km_to_m(distance_km(a, b))
}

#[inline]
pub fn km_to_m(km: f64) -> u64 {
    (km * 1000.0).round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    #[test]
    fn test_zero_for_same_point() {
        let p = coord(54.8520, -1.5711);
        assert_eq!(distance_km(p, p), 0.0);
    }

    #[test]
    fn test_symmetric() {
        let pairs = [
            (coord(54.8520, -1.5711), coord(55.6090, -1.7109)),
            (coord(-33.8688, 151.2093), coord(51.5074, -0.1278)),
            (coord(0.0, 179.9), coord(0.0, -179.9)),
            (coord(89.9, 0.0), coord(-89.9, 180.0)),
        ];
        for (a, b) in pairs {
            assert_eq!(distance_km(a, b), distance_km(b, a));
            assert!(distance_km(a, b) >= 0.0);
        }
    }

    #[test]
    fn test_known_distance() {
        // Lambton Worm site to Bamburgh Castle, roughly 85 km
        let d = distance_km(coord(54.8520, -1.5711), coord(55.6090, -1.7109));
        assert!((d - 84.7).abs() < 1.0, "got {d}");
    }

    #[test]
    fn test_one_degree_latitude() {
        let d = distance_km(coord(0.0, 0.0), coord(1.0, 0.0));
        assert!((d - 111.19).abs() < 0.01, "got {d}");
    }

    #[test]
    fn test_antipodal_is_half_circumference() {
        let d = distance_km(coord(0.0, 0.0), coord(0.0, 180.0));
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn test_distance_m_rounding() {
        assert_eq!(km_to_m(0.0994), 99);
        assert_eq!(km_to_m(0.0996), 100);
        assert_eq!(distance_m(coord(1.0, 1.0), coord(1.0, 1.0)), 0);
    }
}
