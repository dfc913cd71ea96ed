//! Open-Meteo geocoding API (no API key required)

use super::{GeocodeResult, Geocoder};
use crate::config::CuacaConfig;
use crate::error::CuacaError;
use crate::http;
use crate::models::Coordinates;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    name: String,
    latitude: f64,
    longitude: f64,
    admin1: Option<String>,
    admin2: Option<String>,
}

pub struct OpenMeteoGeocoder {
    base_url: String,
    count: u32,
}

impl OpenMeteoGeocoder {
    #[must_use]
    pub fn new(base_url: impl Into<String>, count: u32) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            count,
        }
    }

    #[must_use]
    pub fn from_config(config: &CuacaConfig) -> Self {
        Self::new(
            config.geocoding.open_meteo_base_url.clone(),
            config.geocoding.result_count,
        )
    }

    fn search_url(&self, query: &str) -> String {
        format!(
            "{}/search?name={}&count={}&language=id&countryCode=ID&format=json",
            self.base_url,
            urlencoding::encode(query),
            self.count
        )
    }
}

#[async_trait]
impl Geocoder for OpenMeteoGeocoder {
    fn name(&self) -> &'static str {
        "open-meteo"
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &str) -> Result<Vec<GeocodeResult>, CuacaError> {
        let response: SearchResponse = http::get_json(&self.search_url(query)).await?;
        debug!("Open-Meteo returned {} results", response.results.len());

        Ok(response
            .results
            .into_iter()
            .filter_map(|r| {
                let coordinates = Coordinates::new(r.latitude, r.longitude).ok()?;
                Some(GeocodeResult {
                    name: r.name,
                    coordinates,
                    admin: r.admin1.or(r.admin2),
                    provider: "Open-Meteo".to_string(),
                })
            })
            .collect())
    }
}
