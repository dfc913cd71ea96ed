//! BMKG public forecast API
//!
//! `GET <base>?adm4=35.15.02.2018` answers with the forecast of one village;
//! `?adm1=35` with the forecasts of many locations in a province, of which
//! the one nearest the target is used. Entries come as a list of days, each
//! a list of (usually three-hourly) forecast points.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Asia::Jakarta;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::{ForecastProvider, ForecastTarget, parse_utc};
use crate::config::CuacaConfig;
use crate::error::{CuacaError, ErrorCode};
use crate::http;
use crate::models::{AdmLevel, Coordinates, Forecast, ForecastSample, ForecastSource, RegionCode};

#[derive(Debug, Deserialize)]
struct BmkgResponse {
    #[serde(default)]
    data: Vec<BmkgLocationForecast>,
}

#[derive(Debug, Deserialize)]
struct BmkgLocationForecast {
    #[serde(default)]
    lokasi: Option<BmkgLocation>,
    #[serde(default)]
    cuaca: Vec<Vec<BmkgEntry>>,
}

#[derive(Debug, Default, Deserialize)]
struct BmkgLocation {
    desa: Option<String>,
    kecamatan: Option<String>,
    kotkab: Option<String>,
    provinsi: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

impl BmkgLocation {
    fn name(&self) -> Option<String> {
        [&self.desa, &self.kecamatan, &self.kotkab, &self.provinsi]
            .into_iter()
            .flatten()
            .find(|n| !n.is_empty())
            .cloned()
    }

    fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::new(self.lat?, self.lon?).ok()
    }
}

#[derive(Debug, Deserialize)]
struct BmkgEntry {
    utc_datetime: Option<String>,
    local_datetime: Option<String>,
    datetime: Option<String>,
    /// Temperature, Celsius
    t: Option<f32>,
    /// Relative humidity, percent
    hu: Option<f32>,
    /// Precipitation, mm
    tp: Option<f32>,
    /// Total cloud cover, percent
    tcc: Option<f32>,
    /// Wind speed, km/h
    ws: Option<f32>,
    wd_deg: Option<f32>,
    weather_desc: Option<String>,
}

impl BmkgEntry {
    fn time(&self) -> Option<DateTime<Utc>> {
        if let Some(t) = self.utc_datetime.as_deref().and_then(parse_utc) {
            return Some(t);
        }
        if let Some(t) = self.datetime.as_deref().and_then(parse_utc) {
            return Some(t);
        }
        // Local times are WIB
        let local = self.local_datetime.as_deref()?;
        let naive = NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M:%S").ok()?;
        Jakarta
            .from_local_datetime(&naive)
            .single()
            .map(|t| t.with_timezone(&Utc))
    }

    fn into_sample(self) -> Option<ForecastSample> {
        let time = self.time()?;
        Some(ForecastSample {
            temperature_c: self.t,
            humidity_pct: self.hu,
            precipitation_mm: self.tp,
            precipitation_probability_pct: None,
            wind_speed_kmh: self.ws,
            wind_direction_deg: self.wd_deg,
            cloud_cover_pct: self.tcc,
            description: self.weather_desc,
            ..ForecastSample::at(time)
        })
    }
}

/// Administrative level a BMKG request is made at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BmkgLevel {
    /// `adm4`, one village
    Village,
    /// `adm1`, a whole province
    Province,
}

impl BmkgLevel {
    fn adm(self) -> AdmLevel {
        match self {
            BmkgLevel::Village => AdmLevel::Village,
            BmkgLevel::Province => AdmLevel::Province,
        }
    }
}

pub struct BmkgProvider {
    base_url: String,
    level: BmkgLevel,
    /// Province codes served; empty serves all
    provinces: Vec<String>,
}

impl BmkgProvider {
    #[must_use]
    pub fn new(base_url: impl Into<String>, level: BmkgLevel, provinces: Vec<String>) -> Self {
        Self {
            base_url: base_url.into(),
            level,
            provinces,
        }
    }

    #[must_use]
    pub fn from_config(config: &CuacaConfig, level: BmkgLevel) -> Self {
        Self::new(
            config.weather.bmkg_base_url.clone(),
            level,
            config.weather.bmkg_provinces.clone(),
        )
    }

    fn code_for<'t>(&self, target: &'t ForecastTarget) -> Option<&'t RegionCode> {
        match self.level {
            BmkgLevel::Village => target.village.as_ref(),
            BmkgLevel::Province => target.province.as_ref(),
        }
    }

    fn forecast_url(&self, code: &RegionCode) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}{}={}",
            self.base_url,
            separator,
            self.level.adm().as_param(),
            code
        )
    }

    /// Location forecast nearest the target; the first one when none
    /// reports coordinates
    fn pick_location(
        mut data: Vec<BmkgLocationForecast>,
        target: &Coordinates,
    ) -> Option<BmkgLocationForecast> {
        let nearest = data
            .iter()
            .enumerate()
            .filter_map(|(i, d)| {
                let c = d.lokasi.as_ref()?.coordinates()?;
                Some((i, c.distance_km(target)))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i);

        match nearest {
            Some(i) => Some(data.swap_remove(i)),
            None => data.into_iter().next(),
        }
    }
}

#[async_trait]
impl ForecastProvider for BmkgProvider {
    fn source(&self) -> ForecastSource {
        ForecastSource::Bmkg
    }

    fn label(&self) -> String {
        format!("BMKG ({})", self.level.adm().as_param())
    }

    fn skip_reason(&self, target: &ForecastTarget) -> Option<String> {
        let Some(code) = self.code_for(target) else {
            return Some(format!(
                "no {} code for {}",
                self.level.adm().as_param(),
                target.name
            ));
        };
        let province = code.province();
        if !self.provinces.is_empty() && !self.provinces.iter().any(|p| p == province.as_str()) {
            return Some(format!("province {province} is not covered"));
        }
        None
    }

    #[instrument(skip(self, target), fields(level = ?self.level, target = %target.name))]
    async fn fetch(&self, target: &ForecastTarget) -> Result<Forecast, CuacaError> {
        let code = self.code_for(target).ok_or_else(|| {
            CuacaError::validation(format!(
                "No {} code for {}",
                self.level.adm().as_param(),
                target.name
            ))
        })?;

        let start = Instant::now();
        let response: BmkgResponse = http::get_json(&self.forecast_url(code)).await?;
        debug!("BMKG returned {} location forecasts", response.data.len());

        let chosen = Self::pick_location(response.data, &target.coordinates).ok_or_else(|| {
            CuacaError::api_with_context(
                "BMKG response contains no forecast data",
                ErrorCode::ApiNoData,
                HashMap::from([("code".to_string(), code.to_string())]),
            )
        })?;

        let lokasi = chosen.lokasi.unwrap_or_default();
        let mut skipped = 0usize;
        let samples: Vec<ForecastSample> = chosen
            .cuaca
            .into_iter()
            .flatten()
            .filter_map(|entry| {
                let sample = entry.into_sample();
                if sample.is_none() {
                    skipped += 1;
                }
                sample
            })
            .collect();
        if skipped > 0 {
            warn!("Skipped {} BMKG entries without a usable time", skipped);
        }

        info!(
            "BMKG returned {} samples for {} in {:.3}s",
            samples.len(),
            code,
            start.elapsed().as_secs_f64()
        );

        Ok(Forecast::new(
            ForecastSource::Bmkg,
            lokasi.name().unwrap_or_else(|| target.name.clone()),
            lokasi.coordinates().or(Some(target.coordinates)),
            samples,
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn village_body() -> serde_json::Value {
        serde_json::json!({
            "lokasi": {"adm4": "35.15.02.2018", "desa": "Simogirang", "lat": -7.46, "lon": 112.59},
            "data": [{
                "lokasi": {"adm4": "35.15.02.2018", "desa": "Simogirang", "kecamatan": "Prambon",
                           "lat": -7.46, "lon": 112.59},
                "cuaca": [[
                    {"utc_datetime": "2025-01-01 00:00:00", "local_datetime": "2025-01-01 07:00:00",
                     "t": 25, "hu": 90, "tp": 0.0, "tcc": 80, "ws": 4.1, "wd_deg": 270,
                     "weather_desc": "Berawan"},
                    {"utc_datetime": "2025-01-01 03:00:00", "local_datetime": "2025-01-01 10:00:00",
                     "t": 29, "hu": 75, "tp": 1.2, "tcc": 95, "ws": 8.3, "wd_deg": 300,
                     "weather_desc": "Hujan Ringan"}
                ], [
                    {"local_datetime": "2025-01-02 07:00:00", "t": 24, "hu": 92,
                     "weather_desc": "Cerah Berawan"}
                ]]
            }]
        })
    }

    fn target() -> ForecastTarget {
        ForecastTarget {
            name: "Simogirang".into(),
            coordinates: Coordinates::new(-7.46, 112.59).unwrap(),
            village: Some(RegionCode::parse("35.15.02.2018").unwrap()),
            province: Some(RegionCode::parse("35").unwrap()),
        }
    }

    #[tokio::test]
    async fn test_village_forecast() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("adm4", "35.15.02.2018"))
            .respond_with(ResponseTemplate::new(200).set_body_json(village_body()))
            .mount(&server)
            .await;

        let provider = BmkgProvider::new(server.uri(), BmkgLevel::Village, vec![]);
        let forecast = provider.fetch(&target()).await.unwrap();

        assert_eq!(forecast.source, ForecastSource::Bmkg);
        assert_eq!(forecast.location_name, "Simogirang");
        assert_eq!(forecast.samples.len(), 3);
        assert_eq!(forecast.samples[1].precipitation_mm, Some(1.2));
        assert_eq!(forecast.samples[1].wind_speed_kmh, Some(8.3));
        // Local 07:00 WIB is 00:00 UTC
        assert_eq!(
            forecast.samples[2].time,
            Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_province_forecast_uses_nearest_location() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "data": [
                {"lokasi": {"kotkab": "Kota Madiun", "lat": -7.63, "lon": 111.52},
                 "cuaca": [[{"utc_datetime": "2025-01-01 00:00:00", "t": 22}]]},
                {"lokasi": {"kotkab": "Kab. Sidoarjo", "lat": -7.45, "lon": 112.70},
                 "cuaca": [[{"utc_datetime": "2025-01-01 00:00:00", "t": 28}]]}
            ]
        });
        Mock::given(method("GET"))
            .and(query_param("adm1", "35"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let provider = BmkgProvider::new(server.uri(), BmkgLevel::Province, vec![]);
        let forecast = provider.fetch(&target()).await.unwrap();
        assert_eq!(forecast.location_name, "Kab. Sidoarjo");
        assert_eq!(forecast.samples[0].temperature_c, Some(28.0));
    }

    #[tokio::test]
    async fn test_empty_data_is_no_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;

        let provider = BmkgProvider::new(server.uri(), BmkgLevel::Village, vec![]);
        let err = provider.fetch(&target()).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ApiNoData));
    }

    #[test]
    fn test_skip_reasons() {
        let provider = BmkgProvider::new("http://bmkg", BmkgLevel::Village, vec!["35".into()]);
        assert!(provider.skip_reason(&target()).is_none());

        let mut outside = target();
        outside.village = Some(RegionCode::parse("33.01.01.2001").unwrap());
        assert!(provider.skip_reason(&outside).unwrap().contains("33"));

        let no_code = ForecastTarget::at("Laut", Coordinates::new(-7.0, 113.0).unwrap());
        assert!(provider.skip_reason(&no_code).unwrap().contains("adm4"));
        assert_eq!(provider.label(), "BMKG (adm4)");
    }

    #[test]
    fn test_forecast_url() {
        let provider = BmkgProvider::new("https://bmkg/api/df/v1/forecast/adm", BmkgLevel::Province, vec![]);
        let code = RegionCode::parse("35").unwrap();
        assert_eq!(provider.forecast_url(&code), "https://bmkg/api/df/v1/forecast/adm?adm1=35");
    }
}
