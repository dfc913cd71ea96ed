//! Forecast service: region query in, rendered-ready report out
//!
//! Resolution, coordinate derivation, the provider fallback chain and the
//! METAR lookup run one after the other for each request.

use chrono_tz::Tz;
use tracing::{info, instrument, warn};

use crate::config::CuacaConfig;
use crate::error::CuacaError;
use crate::geocode::GeocoderChain;
use crate::location_resolver::{LocationResolver, ResolvedLocation};
use crate::metar::{self, MetarClient, MetarReport};
use crate::models::Coordinates;
use crate::region::{Candidate, MatchStrategy, RegionQuery, RegionResolver, RegionTable, Resolution};
use crate::render::ForecastReport;
use crate::summary::Language;
use crate::weather::{ForecastChain, ForecastTarget, SourcePreference};

/// Where a forecast is wanted
#[derive(Debug, Clone)]
pub enum Place {
    Region(RegionQuery),
    Coordinates { name: String, coordinates: Coordinates },
}

/// METAR behaviour for a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MetarChoice {
    /// Nearest station within the configured distance
    #[default]
    Nearest,
    Station(String),
    Off,
}

#[derive(Debug, Clone)]
pub struct ForecastRequest {
    pub place: Place,
    /// 1-based choice among ambiguous candidates
    pub pick: Option<usize>,
    pub source: SourcePreference,
    pub metar: MetarChoice,
    pub strategy: Option<MatchStrategy>,
    pub language: Option<Language>,
}

impl ForecastRequest {
    #[must_use]
    pub fn new(place: Place) -> Self {
        Self {
            place,
            pick: None,
            source: SourcePreference::Auto,
            metar: MetarChoice::Nearest,
            strategy: None,
            language: None,
        }
    }
}

/// The candidate to use and, when the query was ambiguous, the warning to show
fn choose(
    resolution: Resolution,
    pick: Option<usize>,
) -> Result<(Candidate, Option<String>), CuacaError> {
    match (resolution, pick) {
        (Resolution::Ambiguous { candidates, total }, None) => {
            let first = candidates
                .into_iter()
                .next()
                .ok_or_else(|| CuacaError::validation("No candidates to choose from"))?;
            let warning = format!(
                "{total} regions match; using '{}' (choose another with --pick)",
                first.context
            );
            Ok((first, Some(warning)))
        }
        (resolution, pick) => Ok((resolution.pick(pick.unwrap_or(1))?, None)),
    }
}

pub struct ForecastService {
    config: CuacaConfig,
    table: RegionTable,
    geocoders: GeocoderChain,
    timezone: Tz,
    language: Language,
}

impl ForecastService {
    pub fn new(config: CuacaConfig, table: RegionTable) -> Result<Self, CuacaError> {
        let geocoders = GeocoderChain::from_config(&config);
        Self::with_geocoders(config, table, geocoders)
    }

    pub fn with_geocoders(
        config: CuacaConfig,
        table: RegionTable,
        geocoders: GeocoderChain,
    ) -> Result<Self, CuacaError> {
        Ok(Self {
            timezone: config.timezone()?,
            language: config.language()?,
            config,
            table,
            geocoders,
        })
    }

    #[must_use]
    pub fn table(&self) -> &RegionTable {
        &self.table
    }

    /// Match a query against the region table
    pub fn search(
        &self,
        query: &RegionQuery,
        strategy: Option<MatchStrategy>,
    ) -> Result<Resolution, CuacaError> {
        let strategy = match strategy {
            Some(strategy) => strategy,
            None => self.config.match_strategy()?,
        };
        RegionResolver::new(&self.table, strategy)
            .with_max_candidates(self.config.defaults.max_candidates)
            .resolve(query)
    }

    /// Resolve a query all the way to coordinates
    pub async fn locate(
        &self,
        query: &RegionQuery,
        pick: Option<usize>,
        strategy: Option<MatchStrategy>,
    ) -> Result<ResolvedLocation, CuacaError> {
        let (candidate, ambiguity) = choose(self.search(query, strategy)?, pick)?;
        let resolver = LocationResolver::new(
            &self.table,
            &self.geocoders,
            &self.config.geocoding.region_hint,
        );
        let mut location = resolver.locate(&candidate.record).await?;
        if let Some(warning) = ambiguity {
            location.warnings.insert(0, warning);
        }
        Ok(location)
    }

    #[instrument(skip(self, request), fields(source = %request.source))]
    pub async fn forecast(&self, request: &ForecastRequest) -> Result<ForecastReport, CuacaError> {
        let language = request.language.unwrap_or(self.language);
        let chain = ForecastChain::for_preference(request.source, &self.config);

        match &request.place {
            Place::Region(query) => {
                let location = self.locate(query, request.pick, request.strategy).await?;
                let outcome = chain.run(&ForecastTarget::from(&location)).await?;
                let (metar, metar_warning) = self.metar(&location.coordinates, &request.metar).await;
                let mut report = ForecastReport::from_location(
                    &location,
                    outcome,
                    metar,
                    self.timezone,
                    language,
                );
                report.warnings.extend(metar_warning);
                info!("Forecast ready for {}", report.label);
                Ok(report)
            }
            Place::Coordinates { name, coordinates } => {
                let outcome = chain.run(&ForecastTarget::at(name.clone(), *coordinates)).await?;
                let (metar, metar_warning) = self.metar(coordinates, &request.metar).await;
                let mut report = ForecastReport::at_coordinates(
                    name.clone(),
                    *coordinates,
                    outcome,
                    metar,
                    self.timezone,
                    language,
                );
                report.warnings.extend(metar_warning);
                Ok(report)
            }
        }
    }

    /// Latest METAR for the request; a failure only produces a warning
    async fn metar(
        &self,
        coordinates: &Coordinates,
        choice: &MetarChoice,
    ) -> (Option<MetarReport>, Option<String>) {
        let station = match choice {
            MetarChoice::Off => return (None, None),
            MetarChoice::Station(icao) => icao.clone(),
            MetarChoice::Nearest => {
                match metar::nearest_station(coordinates, self.config.defaults.metar_max_distance_km) {
                    Some((station, distance)) => {
                        info!("Nearest METAR station {} at {:.1} km", station.icao, distance);
                        station.icao.to_string()
                    }
                    None => return (None, None),
                }
            }
        };

        match MetarClient::from_config(&self.config).latest(&station).await {
            Ok(report) => (Some(report), None),
            Err(e) => {
                warn!("METAR for {} unavailable: {}", station, e);
                (None, Some(format!("METAR {station}: {e}")))
            }
        }
    }
}
