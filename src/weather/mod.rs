//! Forecast fetchers
//!
//! Every upstream service implements [`ForecastProvider`]. Providers turn
//! the service's JSON into a [`Forecast`] of hourly [`ForecastSample`]s;
//! `fallback` chains them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use sunrise::{SolarDay, SolarEvent};

use crate::error::CuacaError;
use crate::location_resolver::ResolvedLocation;
use crate::models::{Coordinates, Forecast, ForecastSource, RegionCode};

pub mod bmkg;
pub mod fallback;
pub mod met_no;
pub mod open_meteo;

pub use bmkg::{BmkgLevel, BmkgProvider};
pub use fallback::{Attempt, AttemptOutcome, FallbackOutcome, ForecastChain, SourcePreference};
pub use met_no::MetNorwayProvider;
pub use open_meteo::OpenMeteoProvider;

/// What a forecast is requested for
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastTarget {
    pub name: String,
    pub coordinates: Coordinates,
    /// adm4 code, when the location lies in the region table
    pub village: Option<RegionCode>,
    /// adm1 code of the enclosing province
    pub province: Option<RegionCode>,
}

impl ForecastTarget {
    /// Target for a bare coordinate pair
    #[must_use]
    pub fn at(name: impl Into<String>, coordinates: Coordinates) -> Self {
        Self {
            name: name.into(),
            coordinates,
            village: None,
            province: None,
        }
    }

    /// Cache key fragment identifying the target
    #[must_use]
    pub fn key(&self) -> String {
        match &self.village {
            Some(village) => format!("{}@{}", village, self.coordinates.cache_key()),
            None => self.coordinates.cache_key(),
        }
    }
}

impl From<&ResolvedLocation> for ForecastTarget {
    fn from(location: &ResolvedLocation) -> Self {
        Self {
            name: location.record.name.clone(),
            coordinates: location.coordinates,
            village: location.village.clone(),
            province: Some(location.record.code.province()),
        }
    }
}

#[async_trait]
pub trait ForecastProvider: Send + Sync {
    fn source(&self) -> ForecastSource;

    /// Name shown in fallback warnings, e.g. "BMKG (adm4)"
    fn label(&self) -> String {
        self.source().display_name().to_string()
    }

    /// Why this provider cannot serve the target, if it cannot
    fn skip_reason(&self, _target: &ForecastTarget) -> Option<String> {
        None
    }

    async fn fetch(&self, target: &ForecastTarget) -> Result<Forecast, CuacaError>;
}

/// Sunrise and sunset for a location on a date, `None` in polar day or night
pub fn get_sunrise_sunset(
    coordinates: &Coordinates,
    date: NaiveDate,
) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
    let point = sunrise::Coordinates::new(coordinates.latitude, coordinates.longitude)
        .with_context(|| {
            format!(
                "Invalid coordinates: lat={}, lng={}",
                coordinates.latitude, coordinates.longitude
            )
        })?;

    let solar_day = SolarDay::new(point, date);
    let sunrise = solar_day.event_time(SolarEvent::Sunrise);
    let sunset = solar_day.event_time(SolarEvent::Sunset);

    Ok(sunrise.zip(sunset))
}

/// Parse a timestamp from a weather API; accepts RFC 3339 and the
/// zone-less `YYYY-MM-DDTHH:MM[:SS]` / `YYYY-MM-DD HH:MM:SS` forms as UTC.
pub(crate) fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Like [`parse_utc`], but zone-less timestamps are wall-clock times in `tz`
pub(crate) fn parse_local(raw: &str, tz: Tz) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|naive| tz.from_local_datetime(&naive).earliest())
        .map(|t| t.with_timezone(&Utc))
}
