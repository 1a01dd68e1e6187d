//! Great-circle distance between resolved locations

use haversine::{Location as HaversineLocation, Units, distance};
use serde::{Deserialize, Serialize};

use crate::models::{DistanceResult, ResolvedLocation};

/// How computed distances are rounded before being reported
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceRounding {
    /// Full floating point precision
    #[default]
    Float,
    /// Whole kilometres, fractional part dropped
    Truncate,
}

impl DistanceRounding {
    #[must_use]
    pub fn apply(self, km: f64) -> f64 {
        match self {
            DistanceRounding::Float => km,
            DistanceRounding::Truncate => km.trunc(),
        }
    }
}

/// Great-circle distance in kilometres between two coordinate pairs.
///
/// Uses a spherical Earth on purpose (New York to London is about 5570 km);
/// do not swap in an ellipsoidal geodesic, exported distances depend on it.
#[must_use]
pub fn haversine_km(from: [f64; 2], to: [f64; 2]) -> f64 {
    let from = HaversineLocation {
        latitude: from[0],
        longitude: from[1],
    };
    let to = HaversineLocation {
        latitude: to[0],
        longitude: to[1],
    };
    distance(from, to, Units::Kilometers)
}

/// Distance between two endpoints, absent unless both resolved
#[must_use]
pub fn distance_km(
    a: Option<&ResolvedLocation>,
    b: Option<&ResolvedLocation>,
    rounding: DistanceRounding,
) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(rounding.apply(haversine_km(a.lat_lon(), b.lat_lon()))),
        _ => None,
    }
}

/// Build a [`DistanceResult`] from two optional endpoints
#[must_use]
pub fn measure(
    origin: Option<ResolvedLocation>,
    destination: Option<ResolvedLocation>,
    rounding: DistanceRounding,
) -> DistanceResult {
    let distance_km = distance_km(origin.as_ref(), destination.as_ref(), rounding);
    DistanceResult {
        origin,
        destination,
        distance_km,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn at(latitude: f64, longitude: f64) -> ResolvedLocation {
        ResolvedLocation {
            latitude,
            longitude,
            matched_postal_code: None,
            matched_city: None,
            country_code: "XX".to_string(),
        }
    }

    #[test]
    fn test_new_york_to_london() {
        let new_york = at(40.7128, -74.0060);
        let london = at(51.5074, -0.1278);
        let km = distance_km(Some(&new_york), Some(&london), DistanceRounding::Float).unwrap();
        assert!((km - 5570.0).abs() <= 5.0, "got {km}");
    }

    #[rstest]
    #[case(at(40.7128, -74.0060), at(51.5074, -0.1278))]
    #[case(at(-33.8688, 151.2093), at(35.6762, 139.6503))]
    #[case(at(0.0, 179.9), at(0.0, -179.9))]
    fn test_distance_is_symmetric(#[case] a: ResolvedLocation, #[case] b: ResolvedLocation) {
        let ab = distance_km(Some(&a), Some(&b), DistanceRounding::Float).unwrap();
        let ba = distance_km(Some(&b), Some(&a), DistanceRounding::Float).unwrap();
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn test_identical_points_are_zero() {
        let paris = at(48.8566, 2.3522);
        assert_eq!(
            distance_km(Some(&paris), Some(&paris), DistanceRounding::Float),
            Some(0.0)
        );
    }

    #[test]
    fn test_absent_endpoint_gives_absent_distance() {
        let paris = at(48.8566, 2.3522);
        assert_eq!(distance_km(Some(&paris), None, DistanceRounding::Float), None);
        assert_eq!(distance_km(None, Some(&paris), DistanceRounding::Float), None);
        assert_eq!(distance_km(None, None, DistanceRounding::Truncate), None);
    }

    #[test]
    fn test_truncate_rounding() {
        let new_york = at(40.7128, -74.0060);
        let london = at(51.5074, -0.1278);
        let km = distance_km(Some(&new_york), Some(&london), DistanceRounding::Truncate).unwrap();
        assert_eq!(km, km.trunc());
        assert_eq!(DistanceRounding::Truncate.apply(12.99), 12.0);
        assert_eq!(DistanceRounding::Float.apply(12.99), 12.99);
    }

    #[test]
    fn test_measure_keeps_endpoints() {
        let result = measure(Some(at(1.0, 1.0)), None, DistanceRounding::Float);
        assert!(result.origin.is_some());
        assert!(result.destination.is_none());
        assert!(result.distance_km.is_none());
    }
}
