//! Geocoding: free-text place name to coordinates
//!
//! Two services are supported, Open-Meteo's geocoding API and OpenStreetMap
//! Nominatim. [`GeocoderChain`] tries them in order and memoizes every
//! answer in the persistent cache.

pub mod nominatim;
pub mod open_meteo;

use crate::cache;
use crate::config::CuacaConfig;
use crate::error::CuacaError;
use crate::models::Coordinates;
use crate::region::text::fold_key;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

pub use nominatim::NominatimGeocoder;
pub use open_meteo::OpenMeteoGeocoder;

/// One geocoding hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub name: String,
    pub coordinates: Coordinates,
    /// Enclosing administrative area as reported by the service
    pub admin: Option<String>,
    /// Service that produced the hit
    pub provider: String,
}

impl GeocodeResult {
    /// "Prambon (Jawa Timur)"
    #[must_use]
    pub fn label(&self) -> String {
        match &self.admin {
            Some(admin) if !admin.is_empty() => format!("{} ({})", self.name, admin),
            _ => self.name.clone(),
        }
    }
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Short service name used in logs and cache keys
    fn name(&self) -> &'static str;

    /// Search for a place; an empty vector means nothing was found
    async fn search(&self, query: &str) -> Result<Vec<GeocodeResult>, CuacaError>;
}

/// Result of a chain lookup plus the warnings produced on the way
#[derive(Debug, Default)]
pub struct GeocodeLookup {
    pub result: Option<GeocodeResult>,
    pub warnings: Vec<String>,
}

/// Ordered list of geocoders; the first non-empty answer wins
pub struct GeocoderChain {
    geocoders: Vec<Box<dyn Geocoder>>,
    ttl: Duration,
}

impl GeocoderChain {
    #[must_use]
    pub fn new(geocoders: Vec<Box<dyn Geocoder>>, ttl: Duration) -> Self {
        Self { geocoders, ttl }
    }

    /// Open-Meteo first, Nominatim second
    #[must_use]
    pub fn from_config(config: &CuacaConfig) -> Self {
        Self::new(
            vec![
                Box::new(OpenMeteoGeocoder::from_config(config)),
                Box::new(NominatimGeocoder::from_config(config)),
            ],
            Duration::from_secs(config.cache.geocode_ttl_hours * 3600),
        )
    }

    pub async fn locate(&self, query: &str) -> GeocodeLookup {
        let mut lookup = GeocodeLookup::default();

        for geocoder in &self.geocoders {
            match cached_search(geocoder.as_ref(), query, self.ttl).await {
                Ok(results) => match results.into_iter().next() {
                    Some(hit) => {
                        info!(
                            "Geocoded '{}' via {} to {}",
                            query,
                            geocoder.name(),
                            hit.coordinates.format()
                        );
                        lookup.result = Some(hit);
                        return lookup;
                    }
                    None => {
                        debug!("{} found nothing for '{}'", geocoder.name(), query);
                    }
                },
                Err(e) => {
                    warn!("Geocoding '{}' via {} failed: {}", query, geocoder.name(), e);
                    lookup
                        .warnings
                        .push(format!("Geocoding via {} failed: {e}", geocoder.name()));
                }
            }
        }

        lookup
    }
}

/// Search through the persistent cache. Empty answers are cached too so a
/// name that cannot be geocoded is not retried on every run.
pub async fn cached_search(
    geocoder: &dyn Geocoder,
    query: &str,
    ttl: Duration,
) -> Result<Vec<GeocodeResult>, CuacaError> {
    let key = format!("geocode:{}:{}", geocoder.name(), fold_key(query));

    match cache::get::<Vec<GeocodeResult>>(&key).await {
        Ok(Some(hit)) => {
            debug!("Geocode cache hit for {}", key);
            return Ok(hit);
        }
        Ok(None) => {}
        Err(e) => warn!("Geocode cache read failed: {}", e),
    }

    let results = geocoder.search(query).await?;

    if let Err(e) = cache::put(&key, results.clone(), cache::jittered(ttl)).await {
        warn!("Geocode cache write failed: {}", e);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    struct Fixed {
        name: &'static str,
        answer: Option<Vec<GeocodeResult>>,
    }

    #[async_trait]
    impl Geocoder for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn search(&self, _query: &str) -> Result<Vec<GeocodeResult>, CuacaError> {
            self.answer
                .clone()
                .ok_or_else(|| CuacaError::api("HTTP 503", ErrorCode::ApiNetworkError))
        }
    }

    fn hit(provider: &str) -> GeocodeResult {
        GeocodeResult {
            name: "Prambon".into(),
            coordinates: Coordinates::new(-7.47, 112.58).unwrap(),
            admin: Some("Jawa Timur".into()),
            provider: provider.into(),
        }
    }

    #[tokio::test]
    async fn test_chain_skips_failures_and_empty_answers() {
        let chain = GeocoderChain::new(
            vec![
                Box::new(Fixed { name: "broken", answer: None }),
                Box::new(Fixed { name: "empty", answer: Some(vec![]) }),
                Box::new(Fixed { name: "good", answer: Some(vec![hit("good")]) }),
            ],
            Duration::from_secs(60),
        );

        let lookup = chain.locate("Prambon, Jawa Timur").await;
        assert_eq!(lookup.result.unwrap().provider, "good");
        assert_eq!(lookup.warnings.len(), 1);
        assert!(lookup.warnings[0].contains("broken"));
    }

    #[tokio::test]
    async fn test_chain_without_answer() {
        let chain = GeocoderChain::new(
            vec![Box::new(Fixed { name: "empty", answer: Some(vec![]) })],
            Duration::from_secs(60),
        );
        let lookup = chain.locate("Atlantis").await;
        assert!(lookup.result.is_none());
        assert!(lookup.warnings.is_empty());
    }

    #[test]
    fn test_label() {
        assert_eq!(hit("x").label(), "Prambon (Jawa Timur)");
    }
}
