//! Great-circle distance and nearest-first ranking.

use serde::{Deserialize, Serialize};

use crate::constants::EARTH_RADIUS_MILES;
use crate::vendor::VendorRecord;

/// Latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    #[must_use]
    pub fn is_valid(self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Haversine distance to `other` in miles.
    #[must_use]
    pub fn distance_to(self, other: Self) -> f64 {
        distance_miles(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }
}

/// Haversine distance in miles (Earth radius 3,958.8 mi).
#[must_use]
pub fn distance_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_MILES * c
}

/// A vendor annotated with its distance from the ranking origin.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedVendor {
    pub vendor: VendorRecord,
    pub distance: f64,
}

/// Sort vendors nearest-first, dropping those strictly beyond `max_distance_miles`.
///
/// The sort is stable, so equal distances keep their input order. Vendors
/// with unusable coordinates are skipped.
#[must_use]
pub fn rank(
    vendors: Vec<VendorRecord>,
    origin: Coordinates,
    max_distance_miles: f64,
) -> Vec<RankedVendor> {
    let mut ranked: Vec<RankedVendor> = vendors
        .into_iter()
        .filter(|vendor| vendor.coordinates.is_valid())
        .map(|vendor| {
            let distance = origin.distance_to(vendor.coordinates);
            RankedVendor { vendor, distance }
        })
        .filter(|ranked| ranked.distance <= max_distance_miles)
        .collect();
    ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    ranked
}

/// Sum of consecutive great-circle legs along `path`.
#[must_use]
pub fn path_length(path: &[Coordinates]) -> f64 {
    path.windows(2)
        .map(|leg| leg[0].distance_to(leg[1]))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vendor::{ContactInfo, VendorDeals, VendorId};
    use std::collections::BTreeMap;

    const ANCHORAGE: Coordinates = Coordinates::new(61.2176, -149.8997);
    // One degree of latitude along a meridian, in miles.
    const MILES_PER_DEGREE: f64 = EARTH_RADIUS_MILES * std::f64::consts::PI / 180.0;

    fn vendor_north_of_origin(id: &str, miles: f64) -> VendorRecord {
        VendorRecord {
            id: VendorId::from(id),
            name: id.to_string(),
            coordinates: Coordinates::new(
                ANCHORAGE.latitude + miles / MILES_PER_DEGREE,
                ANCHORAGE.longitude,
            ),
            address: None,
            contact: ContactInfo::default(),
            category: None,
            is_partner: false,
            rating: None,
            has_qr_code: false,
            hours: BTreeMap::new(),
            deals: VendorDeals::default(),
        }
    }

    #[test]
    fn distance_is_zero_for_identical_points_and_symmetric() {
        assert!(ANCHORAGE.distance_to(ANCHORAGE).abs() < 1e-9);
        let fairbanks = Coordinates::new(64.8378, -147.7164);
        let there = ANCHORAGE.distance_to(fairbanks);
        let back = fairbanks.distance_to(ANCHORAGE);
        assert!((there - back).abs() < 1e-9);
        // Anchorage to Fairbanks is roughly 260 miles as the crow flies.
        assert!((255.0..265.0).contains(&there), "got {there}");
    }

    #[test]
    fn rank_excludes_vendors_beyond_max_distance() {
        let vendors = vec![
            vendor_north_of_origin("b", 3.0),
            vendor_north_of_origin("a", 1.0),
        ];
        let ranked = rank(vendors, ANCHORAGE, 2.0);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].vendor.id.as_str(), "a");
        assert!((ranked[0].distance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rank_sorts_ascending_and_keeps_input_order_on_ties() {
        let vendors = vec![
            vendor_north_of_origin("far", 4.0),
            vendor_north_of_origin("tie-first", 2.0),
            vendor_north_of_origin("near", 0.5),
            vendor_north_of_origin("tie-second", 2.0),
        ];
        let ranked = rank(vendors, ANCHORAGE, 10.0);
        let order: Vec<&str> = ranked.iter().map(|r| r.vendor.id.as_str()).collect();
        assert_eq!(order, ["near", "tie-first", "tie-second", "far"]);
        assert!(ranked.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn rank_keeps_vendor_exactly_on_the_boundary_and_skips_bad_coordinates() {
        let mut broken = vendor_north_of_origin("broken", 0.1);
        broken.coordinates.latitude = f64::NAN;
        let on_edge = vendor_north_of_origin("edge", 2.0);
        let max = ANCHORAGE.distance_to(on_edge.coordinates);
        let ranked = rank(vec![broken, on_edge], ANCHORAGE, max);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].vendor.id.as_str(), "edge");
    }

    #[test]
    fn path_length_sums_legs() {
        let a = vendor_north_of_origin("a", 1.0).coordinates;
        let b = vendor_north_of_origin("b", 3.0).coordinates;
        let total = path_length(&[ANCHORAGE, a, b]);
        assert!((total - 3.0).abs() < 1e-6);
        assert!(path_length(&[ANCHORAGE]).abs() < f64::EPSILON);
    }
}
