//! Geographic coordinates

use crate::error::CuacaError;
use haversine::{Location as HaversineLocation, Units, distance};
use serde::{Deserialize, Serialize};

/// A point on the earth in decimal degrees
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Coordinates {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
}

impl Coordinates {
    /// Create validated coordinates
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CuacaError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CuacaError::validation(format!(
                "Latitude must be between -90 and 90, got: {latitude}"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CuacaError::validation(format!(
                "Longitude must be between -180 and 180, got: {longitude}"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Format as "lat, lon" with five decimals
    #[must_use]
    pub fn format(&self) -> String {
        format!("{:.5}, {:.5}", self.latitude, self.longitude)
    }

    /// Round coordinates for cache key generation
    #[must_use]
    pub fn rounded(&self, precision: u32) -> (f64, f64) {
        let multiplier = 10_f64.powi(i32::try_from(precision).unwrap_or(4));
        let lat = (self.latitude * multiplier).round() / multiplier;
        let lon = (self.longitude * multiplier).round() / multiplier;
        (lat, lon)
    }

    /// Cache key fragment; nearby points within ~1 km share a key
    #[must_use]
    pub fn cache_key(&self) -> String {
        let (lat, lon) = self.rounded(2);
        format!("{lat:.2}:{lon:.2}")
    }

    /// Great-circle distance in kilometers
    #[must_use]
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        let from = HaversineLocation {
            latitude: self.latitude,
            longitude: self.longitude,
        };
        let to = HaversineLocation {
            latitude: other.latitude,
            longitude: other.longitude,
        };
        distance(from, to, Units::Kilometers)
    }

    /// Arithmetic mean of a set of points; `None` for an empty set.
    /// Adequate at the scale of a regency, not across the antimeridian.
    pub fn centroid<'a>(points: impl IntoIterator<Item = &'a Coordinates>) -> Option<Coordinates> {
        let (count, lat_sum, lon_sum) = points
            .into_iter()
            .fold((0usize, 0.0, 0.0), |(n, lat, lon), p| {
                (n + 1, lat + p.latitude, lon + p.longitude)
            });
        if count == 0 {
            return None;
        }
        let n = count as f64;
        Some(Coordinates {
            latitude: lat_sum / n,
            longitude: lon_sum / n,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_validation() {
        assert!(Coordinates::new(-7.25, 112.75).is_ok());
        assert!(Coordinates::new(91.0, 112.75).is_err());
        assert!(Coordinates::new(-7.25, -181.0).is_err());
    }

    #[test]
    fn test_cache_key_rounds_to_two_decimals() {
        let c = Coordinates::new(-7.248_912, 112.751_234).unwrap();
        assert_eq!(c.cache_key(), "-7.25:112.75");
    }

    #[test]
    fn test_format() {
        let c = Coordinates::new(-7.5, 112.123_456_7).unwrap();
        assert_eq!(c.format(), "-7.50000, 112.12346");
    }

    #[test]
    fn test_centroid() {
        let points = [
            Coordinates::new(-7.0, 112.0).unwrap(),
            Coordinates::new(-8.0, 113.0).unwrap(),
        ];
        let c = Coordinates::centroid(points.iter()).unwrap();
        assert!((c.latitude + 7.5).abs() < 1e-9);
        assert!((c.longitude - 112.5).abs() < 1e-9);
        assert!(Coordinates::centroid(std::iter::empty()).is_none());
    }

    #[test]
    fn test_distance_surabaya_malang() {
        let surabaya = Coordinates::new(-7.2575, 112.7521).unwrap();
        let malang = Coordinates::new(-7.9666, 112.6326).unwrap();
        let d = surabaya.distance_km(&malang);
        assert!(d > 70.0 && d < 90.0, "got {d}");
    }
}
