//! MET Norway Locationforecast 2.0 (compact)
//!
//! Global point forecast; requires an identifying User-Agent, which the
//! shared HTTP client sends.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{info, instrument};

use super::{ForecastProvider, ForecastTarget, parse_utc};
use crate::config::CuacaConfig;
use crate::error::{CuacaError, ErrorCode};
use crate::http;
use crate::models::{Forecast, ForecastSample, ForecastSource};

const MS_TO_KMH: f32 = 3.6;

#[derive(Debug, Deserialize)]
struct CompactResponse {
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct Properties {
    #[serde(default)]
    timeseries: Vec<TimeStep>,
}

#[derive(Debug, Deserialize)]
struct TimeStep {
    time: String,
    data: StepData,
}

#[derive(Debug, Deserialize)]
struct StepData {
    instant: InstantData,
    next_1_hours: Option<Period>,
    next_6_hours: Option<Period>,
}

#[derive(Debug, Deserialize)]
struct InstantData {
    details: InstantDetails,
}

#[derive(Debug, Default, Deserialize)]
struct InstantDetails {
    air_temperature: Option<f32>,
    relative_humidity: Option<f32>,
    /// m/s
    wind_speed: Option<f32>,
    wind_from_direction: Option<f32>,
    cloud_area_fraction: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct Period {
    summary: Option<PeriodSummary>,
    details: Option<PeriodDetails>,
}

#[derive(Debug, Deserialize)]
struct PeriodSummary {
    symbol_code: String,
}

#[derive(Debug, Deserialize)]
struct PeriodDetails {
    precipitation_amount: Option<f32>,
    probability_of_precipitation: Option<f32>,
}

/// Readable text for a MET Norway symbol code such as `lightrainshowers_day`
#[must_use]
pub fn symbol_code_to_description(symbol: &str) -> &'static str {
    let base = symbol
        .trim_end_matches("_day")
        .trim_end_matches("_night")
        .trim_end_matches("_polartwilight");
    match base {
        "clearsky" => "Clear sky",
        "fair" => "Fair",
        "partlycloudy" => "Partly cloudy",
        "cloudy" => "Cloudy",
        "fog" => "Fog",
        "lightrain" => "Light rain",
        "rain" => "Rain",
        "heavyrain" => "Heavy rain",
        "lightrainshowers" => "Light rain showers",
        "rainshowers" => "Rain showers",
        "heavyrainshowers" => "Heavy rain showers",
        "lightrainandthunder" | "lightrainshowersandthunder" => "Light rain and thunder",
        "rainandthunder" | "rainshowersandthunder" => "Rain and thunder",
        "heavyrainandthunder" | "heavyrainshowersandthunder" => "Heavy rain and thunder",
        "lightsleet" | "sleet" | "heavysleet" => "Sleet",
        "lightsnow" | "snow" | "heavysnow" => "Snow",
        _ => "Unknown",
    }
}

fn sample_from_step(step: TimeStep) -> Option<ForecastSample> {
    let time = parse_utc(&step.time)?;
    let details = step.data.instant.details;
    let next_hour = step.data.next_1_hours.as_ref();
    let symbol = next_hour
        .or(step.data.next_6_hours.as_ref())
        .and_then(|p| p.summary.as_ref())
        .map(|s| symbol_code_to_description(&s.symbol_code).to_string());
    let hour_details = next_hour.and_then(|p| p.details.as_ref());

    Some(ForecastSample {
        temperature_c: details.air_temperature,
        humidity_pct: details.relative_humidity,
        precipitation_mm: hour_details.and_then(|d| d.precipitation_amount),
        precipitation_probability_pct: hour_details.and_then(|d| d.probability_of_precipitation),
        wind_speed_kmh: details.wind_speed.map(|ms| ms * MS_TO_KMH),
        wind_direction_deg: details.wind_from_direction,
        cloud_cover_pct: details.cloud_area_fraction,
        description: symbol,
        ..ForecastSample::at(time)
    })
}

pub struct MetNorwayProvider {
    base_url: String,
}

impl MetNorwayProvider {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn from_config(config: &CuacaConfig) -> Self {
        Self::new(config.weather.met_no_base_url.clone())
    }

    fn forecast_url(&self, target: &ForecastTarget) -> String {
        // The API asks for at most four decimals
        format!(
            "{}/compact?lat={:.4}&lon={:.4}",
            self.base_url, target.coordinates.latitude, target.coordinates.longitude
        )
    }
}

#[async_trait]
impl ForecastProvider for MetNorwayProvider {
    fn source(&self) -> ForecastSource {
        ForecastSource::MetNorway
    }

    #[instrument(skip(self, target), fields(lat = target.coordinates.latitude, lon = target.coordinates.longitude))]
    async fn fetch(&self, target: &ForecastTarget) -> Result<Forecast, CuacaError> {
        let start = Instant::now();
        let response: CompactResponse = http::get_json(&self.forecast_url(target)).await?;

        if response.properties.timeseries.is_empty() {
            return Err(CuacaError::api_with_context(
                "MET Norway response contains no time series",
                ErrorCode::ApiNoData,
                HashMap::from([("coordinates".to_string(), target.coordinates.format())]),
            ));
        }

        let samples: Vec<ForecastSample> = response
            .properties
            .timeseries
            .into_iter()
            .filter_map(sample_from_step)
            .collect();
        info!(
            "MET Norway returned {} samples in {:.3}s",
            samples.len(),
            start.elapsed().as_secs_f64()
        );

        Ok(Forecast::new(
            ForecastSource::MetNorway,
            target.name.clone(),
            Some(target.coordinates),
            samples,
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::Coordinates;
    use rstest::rstest;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn compact_body() -> serde_json::Value {
        serde_json::json!({
            "type": "Feature",
            "properties": {
                "timeseries": [
                    {"time": "2025-01-01T00:00:00Z", "data": {
                        "instant": {"details": {"air_temperature": 26.0, "relative_humidity": 85.0,
                            "wind_speed": 2.5, "wind_from_direction": 200.0, "cloud_area_fraction": 70.0}},
                        "next_1_hours": {"summary": {"symbol_code": "lightrainshowers_day"},
                            "details": {"precipitation_amount": 0.3}}
                    }},
                    {"time": "2025-01-01T06:00:00Z", "data": {
                        "instant": {"details": {"air_temperature": 31.0}},
                        "next_6_hours": {"summary": {"symbol_code": "partlycloudy_day"},
                            "details": {"precipitation_amount": 2.0}}
                    }}
                ]
            }
        })
    }

    #[tokio::test]
    async fn test_fetch_converts_units() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compact"))
            .and(query_param("lat", "-7.2575"))
            .respond_with(ResponseTemplate::new(200).set_body_json(compact_body()))
            .mount(&server)
            .await;

        let provider = MetNorwayProvider::new(server.uri());
        let target = ForecastTarget::at("Surabaya", Coordinates::new(-7.2575, 112.7521).unwrap());
        let forecast = provider.fetch(&target).await.unwrap();

        assert_eq!(forecast.samples.len(), 2);
        let first = &forecast.samples[0];
        assert_eq!(first.wind_speed_kmh, Some(9.0));
        assert_eq!(first.precipitation_mm, Some(0.3));
        assert_eq!(first.description.as_deref(), Some("Light rain showers"));
        // Six-hour totals are not spread over hours
        assert_eq!(forecast.samples[1].precipitation_mm, None);
        assert_eq!(forecast.samples[1].description.as_deref(), Some("Partly cloudy"));
    }

    #[tokio::test]
    async fn test_empty_timeseries_is_no_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "properties": {"timeseries": []}
            })))
            .mount(&server)
            .await;

        let provider = MetNorwayProvider::new(server.uri());
        let target = ForecastTarget::at("x", Coordinates::new(0.0, 0.0).unwrap());
        assert_eq!(
            provider.fetch(&target).await.unwrap_err().code(),
            Some(ErrorCode::ApiNoData)
        );
    }

    #[rstest]
    #[case("clearsky_night", "Clear sky")]
    #[case("heavyrainandthunder", "Heavy rain and thunder")]
    #[case("fog", "Fog")]
    #[case("sandstorm", "Unknown")]
    fn test_symbol_codes(#[case] code: &str, #[case] text: &str) {
        assert_eq!(symbol_code_to_description(code), text);
    }
}
