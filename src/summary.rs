//! Daily narrative: morning/afternoon/evening segments, a heuristic reading
//! of the atmospheric dynamics, and sun times.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::fmt;
use std::ops::Range;
use tracing::warn;

use crate::metar::MetarReport;
use crate::models::{Coordinates, Forecast, ForecastSample};
use crate::weather::get_sunrise_sunset;

/// Output language of narrative text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Language {
    #[default]
    Indonesian,
    English,
}

impl Language {
    /// Language by ISO 639-1 code (`id`, `en`)
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_lowercase().as_str() {
            "id" | "ind" => Some(Language::Indonesian),
            "en" | "eng" => Some(Language::English),
            _ => None,
        }
    }

    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Language::Indonesian => "id",
            Language::English => "en",
        }
    }
}

/// Part of the local day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Segment {
    /// 06-12
    Pagi,
    /// 12-18
    Siang,
    /// 18-24
    Malam,
}

impl Segment {
    pub const ALL: [Segment; 3] = [Segment::Pagi, Segment::Siang, Segment::Malam];

    /// Local hours covered, end exclusive
    #[must_use]
    pub fn hours(self) -> Range<u32> {
        match self {
            Segment::Pagi => 6..12,
            Segment::Siang => 12..18,
            Segment::Malam => 18..24,
        }
    }

    #[must_use]
    pub fn for_hour(hour: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.hours().contains(&hour))
    }

    #[must_use]
    pub fn title(self, language: Language) -> &'static str {
        match (self, language) {
            (Segment::Pagi, Language::Indonesian) => "Pagi (06-12)",
            (Segment::Siang, Language::Indonesian) => "Siang (12-18)",
            (Segment::Malam, Language::Indonesian) => "Malam (18-24)",
            (Segment::Pagi, Language::English) => "Morning (06-12)",
            (Segment::Siang, Language::English) => "Afternoon (12-18)",
            (Segment::Malam, Language::English) => "Evening (18-24)",
        }
    }
}

/// Weather class of a segment, from wettest to clearest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Condition {
    HeavyRain,
    LightRain,
    Overcast,
    PartlyCloudy,
    Clear,
    NoData,
}

impl Condition {
    #[must_use]
    pub fn describe(self, language: Language) -> &'static str {
        match (self, language) {
            (Condition::HeavyRain, Language::Indonesian) => "berpotensi hujan sedang hingga lebat",
            (Condition::LightRain, Language::Indonesian) => "berpotensi hujan ringan",
            (Condition::Overcast, Language::Indonesian) => "berawan tebal",
            (Condition::PartlyCloudy, Language::Indonesian) => "cerah berawan",
            (Condition::Clear, Language::Indonesian) => "cerah",
            (Condition::NoData, Language::Indonesian) => "data tidak tersedia",
            (Condition::HeavyRain, Language::English) => "moderate to heavy rain possible",
            (Condition::LightRain, Language::English) => "light rain possible",
            (Condition::Overcast, Language::English) => "overcast",
            (Condition::PartlyCloudy, Language::English) => "partly cloudy",
            (Condition::Clear, Language::English) => "clear",
            (Condition::NoData, Language::English) => "no data available",
        }
    }
}

/// Aggregates over the samples of one segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentSummary {
    pub segment: Segment,
    pub samples: usize,
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub cloud_cover_pct: Option<f64>,
    pub wind_speed_kmh: Option<f64>,
    pub precipitation_probability_pct: f64,
    /// Sum over the segment
    pub precipitation_mm: f64,
    pub condition: Condition,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

/// Mean of the present values, `None` when there are none
fn mean(values: impl Iterator<Item = Option<f32>>) -> Option<f64> {
    let (n, sum) = values
        .flatten()
        .fold((0usize, 0.0f64), |(n, sum), v| (n + 1, sum + f64::from(v)));
    (n > 0).then(|| sum / n as f64)
}

fn classify(precip: f64, pop: f64, cloud: Option<f64>) -> Condition {
    let cloud = cloud.unwrap_or(0.0);
    if precip > 5.0 || pop > 60.0 {
        Condition::HeavyRain
    } else if precip > 1.0 || pop > 30.0 {
        Condition::LightRain
    } else if cloud > 70.0 {
        Condition::Overcast
    } else if cloud > 40.0 {
        Condition::PartlyCloudy
    } else {
        Condition::Clear
    }
}

impl SegmentSummary {
    /// Aggregate the samples of `segment`; samples outside it are ignored
    #[must_use]
    pub fn from_samples(segment: Segment, samples: &[&ForecastSample], tz: Tz) -> Self {
        let hours = segment.hours();
        let selected: Vec<&ForecastSample> = samples
            .iter()
            .copied()
            .filter(|s| hours.contains(&s.local_time(tz).hour()))
            .collect();

        let temperature_c = mean(selected.iter().map(|s| s.temperature_c)).map(|v| round_to(v, 1));
        let humidity_pct = mean(selected.iter().map(|s| s.humidity_pct)).map(|v| round_to(v, 1));
        let cloud_cover_pct = mean(selected.iter().map(|s| s.cloud_cover_pct)).map(|v| round_to(v, 1));
        let wind_speed_kmh = mean(selected.iter().map(|s| s.wind_speed_kmh)).map(|v| round_to(v, 1));
        let precipitation_probability_pct = mean(selected.iter().map(|s| s.precipitation_probability_pct))
            .map_or(0.0, |v| round_to(v, 1));
        let precipitation_mm = round_to(
            selected
                .iter()
                .filter_map(|s| s.precipitation_mm)
                .map(f64::from)
                .sum(),
            2,
        );

        let condition = if temperature_c.is_none() {
            Condition::NoData
        } else {
            classify(precipitation_mm, precipitation_probability_pct, cloud_cover_pct)
        };

        Self {
            segment,
            samples: selected.len(),
            temperature_c,
            humidity_pct,
            cloud_cover_pct,
            wind_speed_kmh,
            precipitation_probability_pct,
            precipitation_mm,
            condition,
        }
    }

    /// One readable line, e.g. "cerah berawan. Suhu ~29.5°C, ..."
    #[must_use]
    pub fn narrative(&self, language: Language) -> String {
        if self.condition == Condition::NoData {
            return match language {
                Language::Indonesian => "Data tidak tersedia.".to_string(),
                Language::English => "No data available.".to_string(),
            };
        }
        let show = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| v.to_string());
        let desc = self.condition.describe(language);
        match language {
            Language::Indonesian => format!(
                "{desc}. Suhu ~{}°C, kelembapan ~{}%, peluang hujan ~{}%, kecepatan angin ~{} km/jam.",
                show(self.temperature_c),
                show(self.humidity_pct),
                self.precipitation_probability_pct,
                show(self.wind_speed_kmh),
            ),
            Language::English => format!(
                "{desc}. Temperature ~{}°C, humidity ~{}%, chance of rain ~{}%, wind speed ~{} km/h.",
                show(self.temperature_c),
                show(self.humidity_pct),
                self.precipitation_probability_pct,
                show(self.wind_speed_kmh),
            ),
        }
    }
}

/// Outcome of the dynamics heuristic, first matching rule wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DynamicsSignal {
    /// Large hour-to-hour wind vector change under humid air
    Convergence,
    AccumulatedRain,
    ConvectiveRisk,
    Stable,
}

impl DynamicsSignal {
    #[must_use]
    pub fn message(self, language: Language) -> &'static str {
        match (self, language) {
            (DynamicsSignal::Convergence, Language::Indonesian) => {
                "Terdapat indikasi pertemuan atau perubahan arah/kecepatan angin signifikan (proxy konvergensi) bersamaan dengan kelembapan tinggi, potensi hujan konvektif lokal meningkat."
            }
            (DynamicsSignal::AccumulatedRain, Language::Indonesian) => {
                "Terlihat akumulasi curah hujan yang cukup hari ini, kemungkinan sistem hujan lokal atau garis konvergensi."
            }
            (DynamicsSignal::ConvectiveRisk, Language::Indonesian) => {
                "Awan dan kelembapan cukup tinggi, waspadai pembentukan awan konvektif terutama sore hari."
            }
            (DynamicsSignal::Stable, Language::Indonesian) => {
                "Tidak terdeteksi indikasi konvergensi kuat; kondisi relatif stabil hari ini."
            }
            (DynamicsSignal::Convergence, Language::English) => {
                "Significant change or meeting of wind direction/speed (convergence proxy) together with high humidity; local convective rain is more likely."
            }
            (DynamicsSignal::AccumulatedRain, Language::English) => {
                "Considerable rainfall accumulates today, possibly a local rain system or convergence line."
            }
            (DynamicsSignal::ConvectiveRisk, Language::English) => {
                "Cloud cover and humidity are fairly high; watch for convective cloud development, especially in the afternoon."
            }
            (DynamicsSignal::Stable, Language::English) => {
                "No strong convergence signal; conditions are relatively stable today."
            }
        }
    }
}

/// Heuristic reading of surface data over a day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dynamics {
    /// Mean absolute hour-to-hour change of the wind components, km/h
    pub wind_variability: f64,
    pub mean_humidity_pct: Option<f64>,
    pub mean_cloud_cover_pct: Option<f64>,
    pub total_precipitation_mm: f64,
    pub signal: DynamicsSignal,
    /// Station and phenomena when the latest METAR reports weather
    pub metar: Option<(String, Vec<String>)>,
}

fn mean_abs_diff(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let total: f64 = values.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    total / (values.len() - 1) as f64
}

impl Dynamics {
    #[must_use]
    pub fn analyze(samples: &[&ForecastSample], metar: Option<&MetarReport>) -> Self {
        // Missing wind counts as calm
        let (u, v): (Vec<f64>, Vec<f64>) = samples
            .iter()
            .map(|s| match (s.wind_speed_kmh, s.wind_direction_deg) {
                (Some(speed), Some(dir)) => {
                    let rad = f64::from(dir).to_radians();
                    (f64::from(speed) * rad.cos(), f64::from(speed) * rad.sin())
                }
                _ => (0.0, 0.0),
            })
            .unzip();
        let wind_variability = round_to((mean_abs_diff(&u) + mean_abs_diff(&v)) / 2.0, 3);

        let mean_humidity_pct = mean(samples.iter().map(|s| s.humidity_pct));
        let mean_cloud_cover_pct = mean(samples.iter().map(|s| s.cloud_cover_pct));
        let total_precipitation_mm: f64 = samples
            .iter()
            .filter_map(|s| s.precipitation_mm)
            .map(f64::from)
            .sum();

        let humid = |threshold: f64| mean_humidity_pct.is_some_and(|rh| rh > threshold);
        let signal = if wind_variability > 1.5 && humid(75.0) {
            DynamicsSignal::Convergence
        } else if total_precipitation_mm > 5.0 {
            DynamicsSignal::AccumulatedRain
        } else if mean_cloud_cover_pct.is_some_and(|c| c > 60.0) && humid(70.0) {
            DynamicsSignal::ConvectiveRisk
        } else {
            DynamicsSignal::Stable
        };

        let metar = metar
            .filter(|report| !report.phenomena.is_empty())
            .map(|report| {
                (
                    report.station.clone(),
                    report.phenomena.iter().map(|p| (*p).to_string()).collect(),
                )
            });

        Self {
            wind_variability,
            mean_humidity_pct,
            mean_cloud_cover_pct,
            total_precipitation_mm: round_to(total_precipitation_mm, 2),
            signal,
            metar,
        }
    }

    /// Signal message followed by the METAR hint, if any
    #[must_use]
    pub fn messages(&self, language: Language) -> Vec<String> {
        let mut messages = vec![self.signal.message(language).to_string()];
        if let Some((station, phenomena)) = &self.metar {
            let codes = phenomena.join("/");
            messages.push(match language {
                Language::Indonesian => format!(
                    "Observasi METAR menunjukkan adanya fenomena ({codes}) di stasiun {station}; ini bisa memperkuat/menandai kondisi lokal."
                ),
                Language::English => format!(
                    "The METAR observation at {station} reports weather ({codes}), which may confirm local conditions."
                ),
            });
        }
        messages
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SunTimes {
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
}

/// Everything said about one local calendar day
#[derive(Debug, Clone, Serialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub segments: Vec<SegmentSummary>,
    pub dynamics: Dynamics,
    pub sun: Option<SunTimes>,
}

fn sun_times(coordinates: &Coordinates, date: NaiveDate) -> Option<SunTimes> {
    match get_sunrise_sunset(coordinates, date) {
        Ok(times) => times.map(|(sunrise, sunset)| SunTimes { sunrise, sunset }),
        Err(e) => {
            warn!("Sun times unavailable for {}: {:#}", date, e);
            None
        }
    }
}

/// Summaries for every local day the forecast covers. Days whose samples
/// all fall before 06:00 (the tail of a UTC-aligned series) are left out.
/// The METAR hint is only attached to the first day, the one it was
/// observed on.
#[must_use]
pub fn summarize(forecast: &Forecast, tz: Tz, metar: Option<&MetarReport>) -> Vec<DaySummary> {
    forecast
        .days(tz)
        .into_iter()
        .map(|date| (date, forecast.samples_on(date, tz)))
        .filter(|(_, samples)| {
            samples
                .iter()
                .any(|s| Segment::for_hour(s.local_time(tz).hour()).is_some())
        })
        .enumerate()
        .map(|(i, (date, samples))| {
            DaySummary {
                date,
                segments: Segment::ALL
                    .iter()
                    .map(|segment| SegmentSummary::from_samples(*segment, &samples, tz))
                    .collect(),
                dynamics: Dynamics::analyze(&samples, metar.filter(|_| i == 0)),
                sun: forecast.coordinates.as_ref().and_then(|c| sun_times(c, date)),
            }
        })
        .collect()
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title(Language::Indonesian))
    }
}
