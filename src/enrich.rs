//! Batch coordinate enrichment of a region table
//!
//! Every row without coordinates is geocoded as `"<nama>, <region>, Indonesia"`.
//! Lookups go through the persistent cache, so an interrupted run picks up
//! where it stopped.

use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::CuacaConfig;
use crate::error::{CuacaError, ErrorCode};
use crate::geocode::{Geocoder, cached_search};
use crate::models::{Coordinates, RegionRecord};
use crate::region::RegionTable;

/// Pause before retrying a lookup that timed out or hit a network error
pub const DEFAULT_RETRY_PAUSE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct EnrichOptions {
    /// Region appended to each query, e.g. "Jawa Timur"
    pub region: String,
    pub max_retries: u32,
    pub retry_pause: Duration,
    pub ttl: Duration,
}

impl EnrichOptions {
    #[must_use]
    pub fn from_config(config: &CuacaConfig) -> Self {
        Self {
            region: config.geocoding.region_hint.clone(),
            max_retries: config.weather.max_retries,
            retry_pause: DEFAULT_RETRY_PAUSE,
            ttl: Duration::from_secs(config.cache.geocode_ttl_hours * 3600),
        }
    }

    fn query(&self, name: &str) -> String {
        if self.region.trim().is_empty() {
            format!("{name}, Indonesia")
        } else {
            format!("{name}, {}, Indonesia", self.region.trim())
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrichStats {
    pub total: usize,
    pub already_present: usize,
    pub geocoded: usize,
    pub not_found: usize,
    pub failed: usize,
}

fn is_transient(error: &CuacaError) -> bool {
    matches!(
        error.code(),
        Some(ErrorCode::ApiNetworkError | ErrorCode::ApiRateLimit)
    )
}

pub struct Enricher<'a> {
    geocoder: &'a dyn Geocoder,
    options: EnrichOptions,
}

impl<'a> Enricher<'a> {
    #[must_use]
    pub fn new(geocoder: &'a dyn Geocoder, options: EnrichOptions) -> Self {
        Self { geocoder, options }
    }

    /// Copy of the table's records with missing coordinates filled in where
    /// the geocoder finds them
    #[instrument(skip(self, table), fields(rows = table.len()))]
    pub async fn enrich(&self, table: &RegionTable) -> (Vec<RegionRecord>, EnrichStats) {
        let mut stats = EnrichStats {
            total: table.len(),
            ..EnrichStats::default()
        };
        // Repeated names within one run are looked up once, failures included
        let mut seen: HashMap<String, Result<Option<Coordinates>, String>> = HashMap::new();
        let mut records = Vec::with_capacity(table.len());

        for record in table.records() {
            let mut record = record.clone();
            if record.coordinates.is_some() {
                stats.already_present += 1;
                records.push(record);
                continue;
            }

            let query = self.options.query(&record.name);
            let found = match seen.get(&query) {
                Some(found) => found.clone(),
                None => {
                    let found = self.lookup(&query).await.map_err(|e| {
                        warn!("Giving up on '{}': {}", query, e);
                        e.to_string()
                    });
                    seen.insert(query.clone(), found.clone());
                    found
                }
            };
            match found {
                Ok(Some(coordinates)) => {
                    stats.geocoded += 1;
                    record.coordinates = Some(coordinates);
                }
                Ok(None) => stats.not_found += 1,
                Err(_) => stats.failed += 1,
            }
            records.push(record);
        }

        info!(
            "Enrichment done: {} present, {} geocoded, {} not found, {} failed",
            stats.already_present, stats.geocoded, stats.not_found, stats.failed
        );
        (records, stats)
    }

    async fn lookup(&self, query: &str) -> Result<Option<Coordinates>, CuacaError> {
        let mut attempt = 0;
        loop {
            debug!("Geocoding '{}' (attempt {})", query, attempt + 1);
            match cached_search(self.geocoder, query, self.options.ttl).await {
                Ok(results) => return Ok(results.into_iter().next().map(|r| r.coordinates)),
                Err(e) if is_transient(&e) && attempt < self.options.max_retries => {
                    attempt += 1;
                    warn!(
                        "Lookup of '{}' failed ({}), retrying in {:?}",
                        query, e, self.options.retry_pause
                    );
                    tokio::time::sleep(self.options.retry_pause).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Write records as `kode,nama,lat,lon`; missing coordinates stay empty
pub fn write_csv<W: Write>(records: &[RegionRecord], writer: W) -> Result<(), CuacaError> {
    let mut out = csv::Writer::from_writer(writer);
    let to_data = |e: csv::Error| CuacaError::data(format!("Failed to write CSV: {e}"));

    out.write_record(["kode", "nama", "lat", "lon"]).map_err(to_data)?;
    for record in records {
        let (lat, lon) = record
            .coordinates
            .map(|c| (c.latitude.to_string(), c.longitude.to_string()))
            .unwrap_or_default();
        out.write_record([record.code.as_str(), record.name.as_str(), &lat, &lon])
            .map_err(to_data)?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_csv_file(records: &[RegionRecord], path: &Path) -> Result<(), CuacaError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    write_csv(records, std::io::BufWriter::new(file))?;
    info!("Wrote {} rows to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::GeocodeResult;
    use crate::region::table::tests::sample_table;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Answers queries from a script, recording what was asked
    struct Scripted {
        answers: Mutex<VecDeque<Result<Vec<GeocodeResult>, CuacaError>>>,
        queries: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(answers: Vec<Result<Vec<GeocodeResult>, CuacaError>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Geocoder for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn search(&self, query: &str) -> Result<Vec<GeocodeResult>, CuacaError> {
            self.queries.lock().unwrap().push(query.to_string());
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn hit(lat: f64, lon: f64) -> Result<Vec<GeocodeResult>, CuacaError> {
        Ok(vec![GeocodeResult {
            name: "x".into(),
            coordinates: Coordinates::new(lat, lon).unwrap(),
            admin: None,
            provider: "scripted".into(),
        }])
    }

    fn options(max_retries: u32) -> EnrichOptions {
        EnrichOptions {
            region: "Jawa Timur".into(),
            max_retries,
            retry_pause: Duration::ZERO,
            ttl: Duration::from_secs(60),
        }
    }

    fn small_table() -> RegionTable {
        let csv = "kode,nama,lat,lon\n35.15,KAB. SIDOARJO,-7.4726,112.6675\n35.15.02,Prambon,,\n35.15.03,Krembung,,\n";
        RegionTable::from_reader(csv.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_enrich_fills_missing_rows_only() {
        let geocoder = Scripted::new(vec![hit(-7.47, 112.58), Ok(vec![])]);
        let enricher = Enricher::new(&geocoder, options(2));
        let (records, stats) = enricher.enrich(&small_table()).await;

        assert_eq!(
            geocoder.queries(),
            vec!["Prambon, Jawa Timur, Indonesia", "Krembung, Jawa Timur, Indonesia"]
        );
        assert_eq!(
            stats,
            EnrichStats { total: 3, already_present: 1, geocoded: 1, not_found: 1, failed: 0 }
        );
        assert_eq!(records[1].coordinates.unwrap().latitude, -7.47);
        assert!(records[2].coordinates.is_none());
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let geocoder = Scripted::new(vec![
            Err(CuacaError::api("timed out", ErrorCode::ApiNetworkError)),
            hit(-7.47, 112.58),
            Err(CuacaError::api("timed out", ErrorCode::ApiNetworkError)),
            Err(CuacaError::api("timed out", ErrorCode::ApiNetworkError)),
        ]);
        let enricher = Enricher::new(&geocoder, options(1));
        let (_, stats) = enricher.enrich(&small_table()).await;

        assert_eq!(geocoder.queries().len(), 4);
        assert_eq!(stats.geocoded, 1);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn test_invalid_response_is_not_retried() {
        let geocoder = Scripted::new(vec![Err(CuacaError::api(
            "bad json",
            ErrorCode::ApiInvalidResponse,
        ))]);
        let enricher = Enricher::new(&geocoder, options(3));
        let (_, stats) = enricher.enrich(&small_table()).await;

        // Second row is a fresh query with an empty answer
        assert_eq!(geocoder.queries().len(), 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.not_found, 1);
    }

    #[tokio::test]
    async fn test_duplicate_names_are_looked_up_once() {
        let csv = "kode,nama\n35.15.02,Prambon\n35.18.01,Prambon\n";
        let table = RegionTable::from_reader(csv.as_bytes()).unwrap();
        let geocoder = Scripted::new(vec![hit(-7.47, 112.58)]);
        let (records, stats) = Enricher::new(&geocoder, options(0)).enrich(&table).await;

        assert_eq!(geocoder.queries().len(), 1);
        assert_eq!(stats.geocoded, 2);
        assert_eq!(records[0].coordinates, records[1].coordinates);
    }

    #[tokio::test]
    async fn test_failed_name_is_not_retried_within_run() {
        let csv = "kode,nama\n35.15.02,Prambon\n35.18.01,Prambon\n35.15.03,Krembung\n";
        let table = RegionTable::from_reader(csv.as_bytes()).unwrap();
        let geocoder = Scripted::new(vec![
            Err(CuacaError::api("timed out", ErrorCode::ApiNetworkError)),
            Err(CuacaError::api("timed out", ErrorCode::ApiNetworkError)),
            hit(-7.51, 112.62),
        ]);
        let (records, stats) = Enricher::new(&geocoder, options(1)).enrich(&table).await;

        assert_eq!(
            geocoder.queries(),
            vec![
                "Prambon, Jawa Timur, Indonesia",
                "Prambon, Jawa Timur, Indonesia",
                "Krembung, Jawa Timur, Indonesia"
            ]
        );
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.geocoded, 1);
        assert!(records[2].coordinates.is_some());
    }

    #[test]
    fn test_write_csv() {
        let table = sample_table();
        let mut out = Vec::new();
        write_csv(&table.records()[..3], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "kode,nama,lat,lon\n35,JAWA TIMUR,,\n35.15,KAB. SIDOARJO,-7.4726,112.6675\n35.15.02,Prambon,,\n"
        );
    }

    #[test]
    fn test_write_csv_file_round_trips_through_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("regions.csv");
        write_csv_file(sample_table().records(), &path).unwrap();

        let reloaded = RegionTable::load(&path).unwrap();
        assert_eq!(reloaded.len(), 12);
        assert_eq!(
            reloaded.records().iter().filter(|r| r.coordinates.is_some()).count(),
            4
        );
    }
}
