//! METAR observations from Indonesian aerodromes
//!
//! Reports are read from the NOAA station text files (`<ICAO>.TXT`, the
//! observation time on the first line and the raw report on the last).

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::cache;
use crate::config::CuacaConfig;
use crate::error::{CuacaError, ErrorCode};
use crate::http;
use crate::models::Coordinates;

/// Weather phenomena picked out of a report, in report-code form
pub const PHENOMENA: [&str; 5] = ["TS", "SH", "RA", "DZ", "FG"];

/// An aerodrome reporting METAR
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Station {
    pub icao: &'static str,
    pub name: &'static str,
    pub latitude: f64,
    pub longitude: f64,
}

impl Station {
    #[must_use]
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

pub const STATIONS: &[Station] = &[
    Station { icao: "WARR", name: "Juanda, Surabaya", latitude: -7.3798, longitude: 112.7869 },
    Station { icao: "WARA", name: "Abdul Rachman Saleh, Malang", latitude: -7.9266, longitude: 112.7145 },
    Station { icao: "WAHI", name: "Yogyakarta International", latitude: -7.9000, longitude: 110.0573 },
    Station { icao: "WARS", name: "Ahmad Yani, Semarang", latitude: -6.9727, longitude: 110.3750 },
    Station { icao: "WIII", name: "Soekarno-Hatta, Jakarta", latitude: -6.1256, longitude: 106.6559 },
    Station { icao: "WICC", name: "Husein Sastranegara, Bandung", latitude: -6.9006, longitude: 107.5763 },
    Station { icao: "WADD", name: "Ngurah Rai, Denpasar", latitude: -8.7482, longitude: 115.1672 },
    Station { icao: "WARQ", name: "Adi Soemarmo, Solo", latitude: -7.5161, longitude: 110.7569 },
    Station { icao: "WADY", name: "Blimbingsari, Banyuwangi", latitude: -8.3102, longitude: 114.3401 },
    Station { icao: "WIMM", name: "Kualanamu, Medan", latitude: 3.6422, longitude: 98.8853 },
    Station { icao: "WAAA", name: "Sultan Hasanuddin, Makassar", latitude: -5.0616, longitude: 119.5540 },
    Station { icao: "WALL", name: "Sultan Aji Muhammad Sulaiman, Balikpapan", latitude: -1.2683, longitude: 116.8945 },
];

/// Station by ICAO code (case-insensitive)
#[must_use]
pub fn station(icao: &str) -> Option<&'static Station> {
    STATIONS.iter().find(|s| s.icao.eq_ignore_ascii_case(icao.trim()))
}

/// Nearest known station within `max_distance_km`, with its distance
#[must_use]
pub fn nearest_station(point: &Coordinates, max_distance_km: f64) -> Option<(&'static Station, f64)> {
    STATIONS
        .iter()
        .map(|s| (s, s.coordinates().distance_km(point)))
        .filter(|(_, d)| *d <= max_distance_km)
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// A fetched report
#[derive(Debug, Clone, Serialize)]
pub struct MetarReport {
    pub station: String,
    pub raw: String,
    pub phenomena: Vec<&'static str>,
}

/// Phenomena codes present in a raw report
///
/// Only weather groups are inspected (the tokens after the wind and
/// visibility groups), so the station identifier or `RMK` remarks never
/// count. `-SHRA` yields `SH` and `RA`.
#[must_use]
pub fn phenomena(raw: &str) -> Vec<&'static str> {
    let mut found: Vec<&'static str> = Vec::new();
    let body = raw.split(" RMK").next().unwrap_or(raw);
    for group in body.split_whitespace().skip(1) {
        let group = group.trim_start_matches(['+', '-']).trim_start_matches("VC");
        if group.is_empty() || group.chars().any(|c| !c.is_ascii_uppercase()) {
            continue;
        }
        if group.len() % 2 != 0 {
            continue;
        }
        let codes = (0..group.len())
            .step_by(2)
            .map(|i| &group[i..i + 2])
            .collect::<Vec<_>>();
        for code in codes {
            if let Some(p) = PHENOMENA.iter().find(|p| **p == code) {
                if !found.contains(p) {
                    found.push(p);
                }
            }
        }
    }
    found
}

pub struct MetarClient {
    base_url: String,
    ttl: Duration,
}

impl MetarClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ttl,
        }
    }

    #[must_use]
    pub fn from_config(config: &CuacaConfig) -> Self {
        Self::new(
            config.weather.metar_base_url.clone(),
            Duration::from_secs(config.cache.metar_ttl_minutes * 60),
        )
    }

    /// Latest report of a station
    #[instrument(skip(self))]
    pub async fn latest(&self, icao: &str) -> Result<MetarReport, CuacaError> {
        let icao = icao.trim().to_uppercase();
        if icao.len() != 4 || !icao.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CuacaError::validation(format!("'{icao}' is not an ICAO station code")));
        }

        let key = format!("metar:{icao}");
        let raw = match cache::get::<String>(&key).await {
            Ok(Some(raw)) => {
                debug!("METAR cache hit for {}", icao);
                raw
            }
            other => {
                if let Err(e) = other {
                    warn!("METAR cache read failed: {}", e);
                }
                let raw = self.fetch(&icao).await?;
                if let Err(e) = cache::put(&key, raw.clone(), cache::jittered(self.ttl)).await {
                    warn!("METAR cache write failed: {}", e);
                }
                raw
            }
        };

        info!("METAR {}: {}", icao, raw);
        Ok(MetarReport {
            phenomena: phenomena(&raw),
            station: icao,
            raw,
        })
    }

    async fn fetch(&self, icao: &str) -> Result<String, CuacaError> {
        let text = http::get_text(&format!("{}/{}.TXT", self.base_url, icao)).await?;
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .map(str::to_string)
            .ok_or_else(|| CuacaError::api(format!("Empty METAR file for {icao}"), ErrorCode::ApiNoData))
    }
}
