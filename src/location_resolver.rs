//! Location Resolution Module
//!
//! Turns a region from the lookup table into coordinates plus the village
//! code BMKG forecasts are keyed by. Coordinates come from the first
//! source that has them: the table row, the centroid of the region's
//! descendants, a geocoding lookup, or the nearest enclosing region.

use crate::error::CuacaError;
use crate::geocode::GeocoderChain;
use crate::models::{Coordinates, RegionCode, RegionRecord};
use crate::region::RegionTable;
use crate::summary::Language;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Where the coordinates of a resolved location came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CoordinateSource {
    /// Latitude/longitude columns of the region's own row
    Table,
    /// Mean of the descendants that carry coordinates
    Descendants { count: usize },
    /// Geocoding service hit
    Geocoded { provider: String, label: String },
    /// Nearest enclosing region with coordinates
    Ancestor { name: String },
}

impl CoordinateSource {
    #[must_use]
    pub fn describe(&self, language: Language) -> String {
        match (self, language) {
            (CoordinateSource::Table, Language::Indonesian) => "tabel wilayah (CSV)".to_string(),
            (CoordinateSource::Table, Language::English) => "region table (CSV)".to_string(),
            (CoordinateSource::Descendants { count }, Language::Indonesian) => {
                format!("rata-rata {count} wilayah di bawahnya")
            }
            (CoordinateSource::Descendants { count }, Language::English) => {
                format!("mean of {count} subregions")
            }
            (CoordinateSource::Geocoded { provider, label }, Language::Indonesian) => {
                format!("geocoding {provider}: {label}")
            }
            (CoordinateSource::Geocoded { provider, label }, Language::English) => {
                format!("{provider} geocoding: {label}")
            }
            (CoordinateSource::Ancestor { name }, Language::Indonesian) => {
                format!("wilayah induk {name}")
            }
            (CoordinateSource::Ancestor { name }, Language::English) => {
                format!("parent region {name}")
            }
        }
    }
}

/// A region with everything needed to request a forecast for it
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedLocation {
    pub record: RegionRecord,
    /// "Simogirang, Prambon, KAB. SIDOARJO, JAWA TIMUR"
    pub label: String,
    pub coordinates: Coordinates,
    pub source: CoordinateSource,
    /// adm4 code for BMKG: the region itself or its first village
    pub village: Option<RegionCode>,
    /// Problems met on the way that the user should see
    pub warnings: Vec<String>,
}

/// Service for deriving coordinates of table regions
pub struct LocationResolver<'a> {
    table: &'a RegionTable,
    geocoders: &'a GeocoderChain,
    region_hint: String,
}

impl<'a> LocationResolver<'a> {
    #[must_use]
    pub fn new(table: &'a RegionTable, geocoders: &'a GeocoderChain, region_hint: &str) -> Self {
        Self {
            table,
            geocoders,
            region_hint: region_hint.trim().to_string(),
        }
    }

    /// Resolve a region into a structured location
    pub async fn locate(&self, record: &RegionRecord) -> Result<ResolvedLocation, CuacaError> {
        debug!("Locating {} ({})", record.name, record.code);

        let village = self.table.first_village_under(&record.code);
        let mut warnings = Vec::new();

        let (coordinates, source) = match self.derive(record, &mut warnings).await {
            Some(found) => found,
            None => return Err(CuacaError::location_not_found(&record.name)),
        };

        info!(
            "Located {} at {} from {:?}",
            record.name,
            coordinates.format(),
            source
        );

        Ok(ResolvedLocation {
            record: record.clone(),
            label: self.table.path_label(record),
            coordinates,
            source,
            village,
            warnings,
        })
    }

    async fn derive(
        &self,
        record: &RegionRecord,
        warnings: &mut Vec<String>,
    ) -> Option<(Coordinates, CoordinateSource)> {
        if let Some(coordinates) = record.coordinates {
            return Some((coordinates, CoordinateSource::Table));
        }

        let known: Vec<Coordinates> = self
            .table
            .descendants(&record.code)
            .into_iter()
            .filter_map(|r| r.coordinates)
            .collect();
        if let Some(centroid) = Coordinates::centroid(&known) {
            debug!("Using centroid of {} descendants", known.len());
            return Some((
                centroid,
                CoordinateSource::Descendants { count: known.len() },
            ));
        }

        let query = self.geocode_query(&record.name);
        warn!("No coordinates for {} in the region table, geocoding '{}'", record.name, query);
        let lookup = self.geocoders.locate(&query).await;
        warnings.extend(lookup.warnings);
        if let Some(hit) = lookup.result {
            return Some((
                hit.coordinates,
                CoordinateSource::Geocoded {
                    label: hit.label(),
                    provider: hit.provider,
                },
            ));
        }

        let ancestor = self
            .table
            .ancestors(record)
            .into_iter()
            .find_map(|a| a.coordinates.map(|c| (c, a.name.clone())));
        if let Some((coordinates, name)) = ancestor {
            warn!("Geocoding failed for {}, using enclosing region {}", record.name, name);
            warnings.push(format!(
                "Coordinates for {} are approximated by {}",
                record.name, name
            ));
            return Some((coordinates, CoordinateSource::Ancestor { name }));
        }

        None
    }

    fn geocode_query(&self, name: &str) -> String {
        if self.region_hint.is_empty() {
            name.to_string()
        } else {
            format!("{name}, {}", self.region_hint)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::geocode::{GeocodeResult, Geocoder};
    use crate::region::table::tests::sample_table;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Records queries and answers with a fixed hit (or an error)
    struct Recording {
        queries: Arc<Mutex<Vec<String>>>,
        hit: Option<Coordinates>,
    }

    #[async_trait]
    impl Geocoder for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn search(&self, query: &str) -> Result<Vec<GeocodeResult>, CuacaError> {
            self.queries.lock().unwrap().push(query.to_string());
            match self.hit {
                Some(coordinates) => Ok(vec![GeocodeResult {
                    name: query.to_string(),
                    coordinates,
                    admin: None,
                    provider: "Test".into(),
                }]),
                None => Err(CuacaError::api("offline", ErrorCode::ApiNetworkError)),
            }
        }
    }

    fn chain(hit: Option<Coordinates>) -> (GeocoderChain, Arc<Mutex<Vec<String>>>) {
        let queries = Arc::new(Mutex::new(Vec::new()));
        let geocoder = Recording {
            queries: Arc::clone(&queries),
            hit,
        };
        (
            GeocoderChain::new(vec![Box::new(geocoder)], Duration::from_secs(60)),
            queries,
        )
    }

    fn record(table: &RegionTable, code: &str) -> RegionRecord {
        table.get(&RegionCode::parse(code).unwrap()).unwrap().clone()
    }

    #[tokio::test]
    async fn test_table_coordinates_win() {
        let table = sample_table();
        let (geocoders, queries) = chain(None);
        let resolver = LocationResolver::new(&table, &geocoders, "Jawa Timur");

        let located = resolver.locate(&record(&table, "35.15.02.2001")).await.unwrap();
        assert_eq!(located.source, CoordinateSource::Table);
        assert_eq!(located.coordinates.latitude, -7.4701);
        assert_eq!(located.village.unwrap().as_str(), "35.15.02.2001");
        assert!(queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_descendant_centroid() {
        let table = sample_table();
        let (geocoders, _) = chain(None);
        let resolver = LocationResolver::new(&table, &geocoders, "Jawa Timur");

        // Prambon has one village with coordinates
        let located = resolver.locate(&record(&table, "35.15.02")).await.unwrap();
        assert_eq!(located.source, CoordinateSource::Descendants { count: 1 });
        assert_eq!(located.coordinates.longitude, 112.5763);
        assert_eq!(located.village.unwrap().as_str(), "35.15.02.2001");
    }

    #[tokio::test]
    async fn test_geocoding_uses_region_hint() {
        let table = sample_table();
        let hit = Coordinates::new(-7.46, 112.59).unwrap();
        let (geocoders, queries) = chain(Some(hit));
        let resolver = LocationResolver::new(&table, &geocoders, "Jawa Timur");

        let located = resolver.locate(&record(&table, "35.15.02.2018")).await.unwrap();
        assert!(matches!(located.source, CoordinateSource::Geocoded { .. }));
        assert_eq!(located.coordinates, hit);
        assert_eq!(queries.lock().unwrap().as_slice(), ["Simogirang, Jawa Timur"]);
    }

    #[tokio::test]
    async fn test_ancestor_fallback_when_geocoding_fails() {
        let table = sample_table();
        let (geocoders, _) = chain(None);
        let resolver = LocationResolver::new(&table, &geocoders, "");

        let located = resolver.locate(&record(&table, "35.15.02.2018")).await.unwrap();
        assert_eq!(
            located.source,
            CoordinateSource::Ancestor { name: "KAB. SIDOARJO".into() }
        );
        // One geocoder failure plus the approximation notice
        assert_eq!(located.warnings.len(), 2);
    }

    #[tokio::test]
    async fn test_nothing_found() {
        let table = sample_table();
        let (geocoders, _) = chain(None);
        let resolver = LocationResolver::new(&table, &geocoders, "Jawa Timur");

        let err = resolver.locate(&record(&table, "35.73.01")).await.unwrap_err();
        assert!(matches!(err, CuacaError::LocationNotFound { .. }));
    }
}
