//! Terminal and JSON presentation of a forecast

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Serialize;
use std::fmt::Write;

use crate::location_resolver::{CoordinateSource, ResolvedLocation};
use crate::metar::MetarReport;
use crate::models::{Coordinates, Forecast, ForecastSample, RegionCode};
use crate::summary::{DaySummary, Language, summarize};
use crate::weather::{Attempt, FallbackOutcome};

/// Map zoom used for the marker link
const MAP_ZOOM: u8 = 10;
const TEMP_BAR_WIDTH: usize = 24;
const PRECIP_BAR_WIDTH: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Narrative, dynamics and the first day's hourly table
    #[default]
    Report,
    /// Hourly table
    Table,
    /// Hourly temperature and precipitation chart
    Chart,
    /// OpenStreetMap link and GeoJSON point
    Map,
    Json,
}

/// Everything shown for one forecast request
#[derive(Debug, Clone, Serialize)]
pub struct ForecastReport {
    pub name: String,
    /// Name with its administrative parents
    pub label: String,
    pub code: Option<RegionCode>,
    pub coordinates: Coordinates,
    pub coordinate_source: Option<CoordinateSource>,
    pub warnings: Vec<String>,
    pub attempts: Vec<Attempt>,
    pub metar: Option<MetarReport>,
    pub days: Vec<DaySummary>,
    pub forecast: Forecast,
    #[serde(skip)]
    pub timezone: Tz,
    #[serde(skip)]
    pub language: Language,
}

impl ForecastReport {
    #[must_use]
    pub fn from_location(
        location: &ResolvedLocation,
        outcome: FallbackOutcome,
        metar: Option<MetarReport>,
        timezone: Tz,
        language: Language,
    ) -> Self {
        let mut report = Self::at_coordinates(
            location.record.name.clone(),
            location.coordinates,
            outcome,
            metar,
            timezone,
            language,
        );
        report.label = location.label.clone();
        report.code = Some(location.record.code.clone());
        report.coordinate_source = Some(location.source.clone());
        let mut warnings = location.warnings.clone();
        warnings.append(&mut report.warnings);
        report.warnings = warnings;
        report
    }

    /// Report for a bare coordinate pair
    #[must_use]
    pub fn at_coordinates(
        name: String,
        coordinates: Coordinates,
        outcome: FallbackOutcome,
        metar: Option<MetarReport>,
        timezone: Tz,
        language: Language,
    ) -> Self {
        let warnings = outcome.warnings();
        let days = summarize(&outcome.forecast, timezone, metar.as_ref());
        Self {
            label: name.clone(),
            name,
            code: None,
            coordinates,
            coordinate_source: None,
            warnings,
            attempts: outcome.attempts,
            metar,
            days,
            forecast: outcome.forecast,
            timezone,
            language,
        }
    }
}

pub fn render(report: &ForecastReport, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Report => report_text(report),
        OutputFormat::Table => hourly_table(&report.forecast.samples, report.timezone, report.language),
        OutputFormat::Chart => chart(&report.forecast.samples, report.timezone),
        OutputFormat::Map => {
            let feature = geojson_point(report);
            format!(
                "{}\n{}\n",
                map_url(&report.coordinates),
                serde_json::to_string_pretty(&feature).context("Failed to serialize GeoJSON")?
            )
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(report).context("Failed to serialize report")? + "\n"
        }
    })
}

/// OpenStreetMap link with a marker on the point
#[must_use]
pub fn map_url(coordinates: &Coordinates) -> String {
    let (lat, lon) = (coordinates.latitude, coordinates.longitude);
    format!("https://www.openstreetmap.org/?mlat={lat:.5}&mlon={lon:.5}#map={MAP_ZOOM}/{lat:.5}/{lon:.5}")
}

/// GeoJSON point feature; coordinates are `[lon, lat]`
#[must_use]
pub fn geojson_point(report: &ForecastReport) -> serde_json::Value {
    serde_json::json!({
        "type": "Feature",
        "geometry": {
            "type": "Point",
            "coordinates": [report.coordinates.longitude, report.coordinates.latitude],
        },
        "properties": {
            "name": report.name,
            "label": report.label,
            "code": report.code.as_ref().map(RegionCode::as_str),
            "source": report.forecast.source.display_name(),
        }
    })
}

fn cell(value: Option<f32>, unit: &str) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}{unit}"))
}

#[must_use]
pub fn hourly_table(samples: &[ForecastSample], tz: Tz, language: Language) -> String {
    let headers = match language {
        Language::Indonesian => ["Waktu", "Suhu", "RH", "Hujan", "Peluang", "Angin", "Awan", "Keterangan"],
        Language::English => ["Time", "Temp", "RH", "Precip", "PoP", "Wind", "Cloud", "Description"],
    };
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<15} {:>7} {:>6} {:>7} {:>7} {:>14} {:>6}  {}",
        headers[0], headers[1], headers[2], headers[3], headers[4], headers[5], headers[6], headers[7]
    );
    for s in samples {
        let _ = writeln!(
            out,
            "{:<15} {:>7} {:>6} {:>7} {:>7} {:>14} {:>6}  {}",
            s.local_time(tz).format("%d/%m %H:%M %Z").to_string(),
            cell(s.temperature_c, "°C"),
            cell(s.humidity_pct, "%"),
            cell(s.precipitation_mm, "mm"),
            cell(s.precipitation_probability_pct, "%"),
            s.format_wind(),
            cell(s.cloud_cover_pct, "%"),
            s.description.as_deref().unwrap_or("-"),
        );
    }
    out
}

fn bar(filled: usize, ch: char) -> String {
    std::iter::repeat_n(ch, filled).collect()
}

/// One line per sample: temperature scaled between the series extremes,
/// precipitation scaled to the wettest hour.
#[must_use]
pub fn chart(samples: &[ForecastSample], tz: Tz) -> String {
    let temps: Vec<f32> = samples.iter().filter_map(|s| s.temperature_c).collect();
    let (min_t, max_t) = temps
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &t| (lo.min(t), hi.max(t)));
    let max_p = samples
        .iter()
        .filter_map(|s| s.precipitation_mm)
        .fold(0.0f32, f32::max);

    let mut out = String::new();
    if !temps.is_empty() {
        let _ = writeln!(out, "°C {min_t:.1} .. {max_t:.1}   mm max {max_p:.1}");
    }
    for s in samples {
        let temp_bar = s.temperature_c.map_or(0, |t| {
            if max_t > min_t {
                ((t - min_t) / (max_t - min_t) * (TEMP_BAR_WIDTH - 1) as f32).round() as usize + 1
            } else {
                TEMP_BAR_WIDTH / 2
            }
        });
        let precip_bar = match s.precipitation_mm {
            Some(p) if max_p > 0.0 && p > 0.0 => {
                ((p / max_p * PRECIP_BAR_WIDTH as f32).round() as usize).max(1)
            }
            _ => 0,
        };
        let _ = writeln!(
            out,
            "{} {:>7} |{:<tw$}| {:>6} |{:<pw$}|",
            s.local_time(tz).format("%d/%m %H:%M"),
            cell(s.temperature_c, "°C"),
            bar(temp_bar, '█'),
            cell(s.precipitation_mm, "mm"),
            bar(precip_bar, '▒'),
            tw = TEMP_BAR_WIDTH,
            pw = PRECIP_BAR_WIDTH,
        );
    }
    out
}

struct Labels {
    location: &'static str,
    coordinates: &'static str,
    taken_from: &'static str,
    source: &'static str,
    warning: &'static str,
    sunrise: &'static str,
    sunset: &'static str,
    dynamics: &'static str,
    hourly: &'static str,
}

const ID_LABELS: Labels = Labels {
    location: "Lokasi",
    coordinates: "Koordinat",
    taken_from: "diambil dari",
    source: "Sumber prakiraan",
    warning: "Peringatan",
    sunrise: "terbit",
    sunset: "terbenam",
    dynamics: "Dinamika atmosfer",
    hourly: "Per jam",
};

const EN_LABELS: Labels = Labels {
    location: "Location",
    coordinates: "Coordinates",
    taken_from: "taken from",
    source: "Forecast source",
    warning: "Warning",
    sunrise: "sunrise",
    sunset: "sunset",
    dynamics: "Atmospheric dynamics",
    hourly: "Hourly",
};

#[must_use]
pub fn report_text(report: &ForecastReport) -> String {
    let language = report.language;
    let labels = match language {
        Language::Indonesian => &ID_LABELS,
        Language::English => &EN_LABELS,
    };
    let tz = report.timezone;
    let mut out = String::new();

    match &report.code {
        Some(code) => {
            let _ = writeln!(out, "{}: {} [{}]", labels.location, report.label, code);
        }
        None => {
            let _ = writeln!(out, "{}: {}", labels.location, report.label);
        }
    }
    let _ = write!(out, "{}: {}", labels.coordinates, report.coordinates.format());
    if let Some(source) = &report.coordinate_source {
        let _ = write!(out, " ({} {})", labels.taken_from, source.describe(language));
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "{}: {}", labels.source, report.forecast.source);
    for warning in &report.warnings {
        let _ = writeln!(out, "{}: {}", labels.warning, warning);
    }
    if let Some(metar) = &report.metar {
        let _ = writeln!(out, "METAR {}: {}", metar.station, metar.raw);
    }

    for day in &report.days {
        let _ = writeln!(out);
        let _ = write!(out, "== {} ==", day.date.format("%Y-%m-%d"));
        if let Some(sun) = &day.sun {
            let _ = write!(
                out,
                "  {} {}, {} {}",
                labels.sunrise,
                sun.sunrise.with_timezone(&tz).format("%H:%M"),
                labels.sunset,
                sun.sunset.with_timezone(&tz).format("%H:%M"),
            );
        }
        let _ = writeln!(out);
        for segment in &day.segments {
            let _ = writeln!(
                out,
                "- {}: {}",
                segment.segment.title(language),
                segment.narrative(language)
            );
        }
        let _ = writeln!(out, "{}:", labels.dynamics);
        for message in day.dynamics.messages(language) {
            let _ = writeln!(out, "  {message}");
        }
    }

    if let Some(first) = report.days.first() {
        let samples: Vec<ForecastSample> = report
            .forecast
            .samples_on(first.date, tz)
            .into_iter()
            .cloned()
            .collect();
        let _ = writeln!(out);
        let _ = writeln!(out, "{}:", labels.hourly);
        out.push_str(&hourly_table(&samples, tz, language));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ForecastSource;
    use crate::weather::AttemptOutcome;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Asia::Jakarta;

    fn forecast() -> Forecast {
        let samples = (0..3)
            .map(|h| ForecastSample {
                temperature_c: Some(26.0 + h as f32),
                humidity_pct: Some(85.0),
                precipitation_mm: Some(if h == 1 { 2.0 } else { 0.0 }),
                precipitation_probability_pct: Some(40.0),
                wind_speed_kmh: Some(12.0),
                wind_direction_deg: Some(225.0),
                cloud_cover_pct: Some(60.0),
                description: Some("Slight rain".to_string()),
                // 07:00-09:00 WIB
                ..ForecastSample::at(Utc.with_ymd_and_hms(2025, 1, 1, h, 0, 0).unwrap())
            })
            .collect();
        Forecast::new(
            ForecastSource::OpenMeteo,
            "Krembung",
            Some(Coordinates::new(-7.5132, 112.6218).unwrap()),
            samples,
        )
    }

    fn report(language: Language) -> ForecastReport {
        let outcome = FallbackOutcome {
            forecast: forecast(),
            attempts: vec![
                Attempt {
                    provider: "BMKG (adm4)".to_string(),
                    outcome: AttemptOutcome::Failed("HTTP 503".to_string()),
                },
                Attempt {
                    provider: "Open-Meteo".to_string(),
                    outcome: AttemptOutcome::Success,
                },
            ],
        };
        ForecastReport::at_coordinates(
            "Krembung".to_string(),
            Coordinates::new(-7.5132, 112.6218).unwrap(),
            outcome,
            None,
            Jakarta,
            language,
        )
    }

    #[test]
    fn test_map_url() {
        let url = map_url(&Coordinates::new(-7.5132, 112.6218).unwrap());
        assert_eq!(
            url,
            "https://www.openstreetmap.org/?mlat=-7.51320&mlon=112.62180#map=10/-7.51320/112.62180"
        );
    }

    #[test]
    fn test_geojson_uses_lon_lat_order() {
        let feature = geojson_point(&report(Language::Indonesian));
        assert_eq!(feature["geometry"]["coordinates"][0], 112.6218);
        assert_eq!(feature["geometry"]["coordinates"][1], -7.5132);
        assert_eq!(feature["properties"]["source"], "Open-Meteo");
    }

    #[test]
    fn test_hourly_table_local_time() {
        let table = hourly_table(&forecast().samples, Jakarta, Language::English);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Time"));
        assert!(lines[1].starts_with("01/01 07:00 WIB"));
        assert!(lines[1].contains("26.0°C"));
        assert!(lines[1].contains("12.0 km/h SW"));
    }

    #[test]
    fn test_chart_scales_bars() {
        let chart = chart(&forecast().samples, Jakarta);
        let lines: Vec<&str> = chart.lines().collect();
        assert_eq!(lines.len(), 4);
        let full = "█".repeat(TEMP_BAR_WIDTH);
        assert!(lines[3].contains(&full));
        assert!(lines[2].contains(&"▒".repeat(PRECIP_BAR_WIDTH)));
        assert!(lines[1].contains("|█ "));
    }

    #[test]
    fn test_report_text_lists_warnings_and_segments() {
        let text = report_text(&report(Language::Indonesian));
        assert!(text.contains("Lokasi: Krembung"));
        assert!(text.contains("Peringatan: BMKG (adm4): failed (HTTP 503)"));
        assert!(text.contains("Sumber prakiraan: Open-Meteo"));
        assert!(text.contains("- Pagi (06-12): berpotensi hujan ringan."));
        assert!(text.contains("- Malam (18-24): Data tidak tersedia."));
        assert!(text.contains("Dinamika atmosfer:"));
    }

    #[test]
    fn test_json_output_parses() {
        let out = render(&report(Language::English), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["name"], "Krembung");
        assert_eq!(value["forecast"]["samples"].as_array().unwrap().len(), 3);
        assert_eq!(value["days"][0]["segments"][0]["segment"], "Pagi");
    }
}
