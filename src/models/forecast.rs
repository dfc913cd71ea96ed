//! Forecast series model

use super::Coordinates;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream service a forecast came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForecastSource {
    /// Badan Meteorologi, Klimatologi, dan Geofisika
    Bmkg,
    OpenMeteo,
    MetNorway,
}

impl ForecastSource {
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            ForecastSource::Bmkg => "BMKG",
            ForecastSource::OpenMeteo => "Open-Meteo",
            ForecastSource::MetNorway => "MET Norway",
        }
    }

    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            ForecastSource::Bmkg => "bmkg",
            ForecastSource::OpenMeteo => "open_meteo",
            ForecastSource::MetNorway => "met_no",
        }
    }
}

impl fmt::Display for ForecastSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One hourly (or three-hourly, for BMKG) forecast point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSample {
    /// Valid time of the sample
    pub time: DateTime<Utc>,
    /// Air temperature in Celsius
    pub temperature_c: Option<f32>,
    /// Relative humidity in percent
    pub humidity_pct: Option<f32>,
    /// Precipitation amount in mm
    pub precipitation_mm: Option<f32>,
    /// Probability of precipitation in percent
    pub precipitation_probability_pct: Option<f32>,
    /// Wind speed in km/h
    pub wind_speed_kmh: Option<f32>,
    /// Direction the wind blows from, degrees (0 = north)
    pub wind_direction_deg: Option<f32>,
    /// Cloud cover in percent
    pub cloud_cover_pct: Option<f32>,
    /// Human-readable weather description
    pub description: Option<String>,
}

impl ForecastSample {
    /// Sample with only a timestamp set
    #[must_use]
    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            time,
            temperature_c: None,
            humidity_pct: None,
            precipitation_mm: None,
            precipitation_probability_pct: None,
            wind_speed_kmh: None,
            wind_direction_deg: None,
            cloud_cover_pct: None,
            description: None,
        }
    }

    /// Valid time in the given zone
    #[must_use]
    pub fn local_time(&self, tz: Tz) -> DateTime<Tz> {
        self.time.with_timezone(&tz)
    }

    pub fn wind_direction_to_cardinal(degrees: f32) -> &'static str {
        let normalized = degrees.rem_euclid(360.0);
        // 16 sectors of 22.5 degrees, centered on each point
        let index = ((normalized + 11.25) / 22.5) as usize % 16;
        [
            "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW",
            "NW", "NNW",
        ][index]
    }

    /// Format wind information, e.g. "12.5 km/h SW"
    #[must_use]
    pub fn format_wind(&self) -> String {
        match (self.wind_speed_kmh, self.wind_direction_deg) {
            (Some(speed), Some(dir)) => {
                format!("{speed:.1} km/h {}", Self::wind_direction_to_cardinal(dir))
            }
            (Some(speed), None) => format!("{speed:.1} km/h"),
            _ => "-".to_string(),
        }
    }
}

/// Forecast series for one location from one source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub source: ForecastSource,
    /// Name reported by the source (or the resolved region name)
    pub location_name: String,
    pub coordinates: Option<Coordinates>,
    /// Samples sorted by time
    pub samples: Vec<ForecastSample>,
    /// When this forecast was retrieved
    pub retrieved_at: DateTime<Utc>,
}

impl Forecast {
    #[must_use]
    pub fn new(
        source: ForecastSource,
        location_name: impl Into<String>,
        coordinates: Option<Coordinates>,
        mut samples: Vec<ForecastSample>,
    ) -> Self {
        samples.sort_by_key(|s| s.time);
        Self {
            source,
            location_name: location_name.into(),
            coordinates,
            samples,
            retrieved_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Distinct local calendar days covered, in order
    #[must_use]
    pub fn days(&self, tz: Tz) -> Vec<NaiveDate> {
        let mut days: Vec<NaiveDate> = Vec::new();
        for sample in &self.samples {
            let day = sample.local_time(tz).date_naive();
            if days.last() != Some(&day) {
                days.push(day);
            }
        }
        days
    }

    /// Samples falling on a local calendar day
    #[must_use]
    pub fn samples_on(&self, day: NaiveDate, tz: Tz) -> Vec<&ForecastSample> {
        self.samples
            .iter()
            .filter(|s| s.local_time(tz).date_naive() == day)
            .collect()
    }
}
