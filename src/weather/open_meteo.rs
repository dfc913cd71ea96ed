//! Open-Meteo hourly forecast (no API key required)

use async_trait::async_trait;
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{info, instrument, warn};

use super::{ForecastProvider, ForecastTarget, parse_local};
use crate::config::CuacaConfig;
use crate::error::{CuacaError, ErrorCode};
use crate::http;
use crate::models::{Forecast, ForecastSample, ForecastSource};

const HOURLY_VARIABLES: &str = "temperature_2m,relativehumidity_2m,cloudcover,precipitation,precipitation_probability,windspeed_10m,winddirection_10m,weathercode";

/// Forecast response; only the hourly block is requested
#[derive(Debug, Deserialize)]
struct ForecastResponse {
    hourly: Option<HourlyData>,
}

/// Hourly weather data from OpenMeteo
#[derive(Debug, Deserialize)]
struct HourlyData {
    time: Vec<String>,
    #[serde(rename = "temperature_2m")]
    temperature: Option<Vec<Option<f32>>>,
    #[serde(rename = "relativehumidity_2m")]
    humidity: Option<Vec<Option<f32>>>,
    #[serde(rename = "cloudcover")]
    cloud_cover: Option<Vec<Option<f32>>>,
    precipitation: Option<Vec<Option<f32>>>,
    precipitation_probability: Option<Vec<Option<f32>>>,
    #[serde(rename = "windspeed_10m")]
    wind_speed: Option<Vec<Option<f32>>>,
    #[serde(rename = "winddirection_10m")]
    wind_direction: Option<Vec<Option<f32>>>,
    #[serde(rename = "weathercode")]
    weather_code: Option<Vec<Option<u8>>>,
}

/// Value `i` of an optional hourly column
fn at<T: Copy>(column: &Option<Vec<Option<T>>>, i: usize) -> Option<T> {
    column.as_ref().and_then(|c| c.get(i).copied().flatten())
}

/// WMO weather interpretation codes
#[must_use]
pub fn weather_code_to_description(code: u8) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Dense freezing drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Heavy freezing rain",
        71 => "Slight snow fall",
        73 => "Moderate snow fall",
        75 => "Heavy snow fall",
        77 => "Snow grains",
        80 => "Slight rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        85 => "Slight snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        _ => "Unknown",
    }
}

/// Days are requested in `timezone` so that `forecast_days` covers whole
/// local days; the returned wall-clock times are converted back to UTC.
pub struct OpenMeteoProvider {
    base_url: String,
    forecast_days: u32,
    timezone: Tz,
}

impl OpenMeteoProvider {
    #[must_use]
    pub fn new(base_url: impl Into<String>, forecast_days: u32, timezone: Tz) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            forecast_days,
            timezone,
        }
    }

    #[must_use]
    pub fn from_config(config: &CuacaConfig) -> Self {
        Self::new(
            config.weather.open_meteo_base_url.clone(),
            config.weather.forecast_days,
            config.timezone().unwrap_or(chrono_tz::Asia::Jakarta),
        )
    }

    fn forecast_url(&self, target: &ForecastTarget) -> String {
        format!(
            "{}/forecast?latitude={:.4}&longitude={:.4}&hourly={}&forecast_days={}&timezone={}",
            self.base_url,
            target.coordinates.latitude,
            target.coordinates.longitude,
            HOURLY_VARIABLES,
            self.forecast_days,
            urlencoding::encode(self.timezone.name())
        )
    }
}

fn samples_from_hourly(hourly: &HourlyData, tz: Tz) -> Vec<ForecastSample> {
    let mut skipped = 0usize;
    let samples: Vec<ForecastSample> = hourly
        .time
        .iter()
        .enumerate()
        .filter_map(|(i, raw)| {
            let Some(time) = parse_local(raw, tz) else {
                skipped += 1;
                return None;
            };
            Some(ForecastSample {
                temperature_c: at(&hourly.temperature, i),
                humidity_pct: at(&hourly.humidity, i),
                precipitation_mm: at(&hourly.precipitation, i),
                precipitation_probability_pct: at(&hourly.precipitation_probability, i),
                wind_speed_kmh: at(&hourly.wind_speed, i),
                wind_direction_deg: at(&hourly.wind_direction, i),
                cloud_cover_pct: at(&hourly.cloud_cover, i),
                description: at(&hourly.weather_code, i)
                    .map(|code| weather_code_to_description(code).to_string()),
                ..ForecastSample::at(time)
            })
        })
        .collect();
    if skipped > 0 {
        warn!("Skipped {} Open-Meteo samples with unparseable time", skipped);
    }
    samples
}

#[async_trait]
impl ForecastProvider for OpenMeteoProvider {
    fn source(&self) -> ForecastSource {
        ForecastSource::OpenMeteo
    }

    #[instrument(skip(self, target), fields(lat = target.coordinates.latitude, lon = target.coordinates.longitude))]
    async fn fetch(&self, target: &ForecastTarget) -> Result<Forecast, CuacaError> {
        let start = Instant::now();
        let response: ForecastResponse = http::get_json(&self.forecast_url(target)).await?;

        let Some(hourly) = response.hourly else {
            return Err(CuacaError::api_with_context(
                "No hourly data in Open-Meteo response",
                ErrorCode::ApiNoData,
                HashMap::from([("coordinates".to_string(), target.coordinates.format())]),
            ));
        };

        let samples = samples_from_hourly(&hourly, self.timezone);
        info!(
            "Open-Meteo returned {} hourly samples in {:.3}s",
            samples.len(),
            start.elapsed().as_secs_f64()
        );

        Ok(Forecast::new(
            ForecastSource::OpenMeteo,
            target.name.clone(),
            Some(target.coordinates),
            samples,
        ))
    }
}
