//! OpenStreetMap Nominatim search
//!
//! The public instance allows about one request per second and rejects
//! clients without a User-Agent, so every request goes through a shared
//! rate limiter.

use super::{GeocodeResult, Geocoder};
use crate::config::CuacaConfig;
use crate::error::CuacaError;
use crate::http::{self, RateLimiter};
use crate::models::Coordinates;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
    display_name: String,
    #[serde(default)]
    name: Option<String>,
}

pub struct NominatimGeocoder {
    base_url: String,
    limit: u32,
    rate_limiter: Mutex<RateLimiter>,
}

impl NominatimGeocoder {
    #[must_use]
    pub fn new(base_url: impl Into<String>, limit: u32, min_interval: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limit,
            rate_limiter: Mutex::new(RateLimiter::new(1, min_interval)),
        }
    }

    #[must_use]
    pub fn from_config(config: &CuacaConfig) -> Self {
        Self::new(
            config.geocoding.nominatim_base_url.clone(),
            config.geocoding.result_count,
            Duration::from_millis(config.geocoding.nominatim_interval_ms),
        )
    }

    fn search_url(&self, query: &str) -> String {
        format!(
            "{}/search?q={}&format=json&limit={}&countrycodes=id",
            self.base_url,
            urlencoding::encode(query),
            self.limit
        )
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    fn name(&self) -> &'static str {
        "nominatim"
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &str) -> Result<Vec<GeocodeResult>, CuacaError> {
        http::acquire(&self.rate_limiter).await;
        let places: Vec<Place> = http::get_json(&self.search_url(query)).await?;
        debug!("Nominatim returned {} places", places.len());

        let results: Vec<GeocodeResult> = places
            .into_iter()
            .filter_map(|p| {
                let coordinates = match (p.lat.parse::<f64>(), p.lon.parse::<f64>()) {
                    (Ok(lat), Ok(lon)) => Coordinates::new(lat, lon).ok(),
                    _ => None,
                };
                let Some(coordinates) = coordinates else {
                    debug!("Skipping '{}' with coordinates '{}', '{}'", p.display_name, p.lat, p.lon);
                    return None;
                };
                let mut parts = p.display_name.split(", ");
                let first = parts.next().unwrap_or_default().to_string();
                Some(GeocodeResult {
                    name: p.name.filter(|n| !n.is_empty()).unwrap_or(first),
                    coordinates,
                    admin: parts.next().map(str::to_string),
                    provider: "Nominatim".to_string(),
                })
            })
            .collect();
        Ok(results)
    }
}
