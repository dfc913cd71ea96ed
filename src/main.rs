//! cuaca: command-line weather forecasts for Indonesian regions
//!
//! Usage examples
//! --------------
//!
//! - Search the region table
//!   $ cuaca search "kedung, sidoarjo"
//!
//! - Forecast for a village, falling back across BMKG, Open-Meteo and MET Norway
//!   $ cuaca forecast "Simogirang, Prambon"
//!   $ cuaca forecast malang --pick 2 --format table
//!
//! - Forecast for a coordinate pair
//!   $ cuaca forecast --lat -7.25 --lon 112.75 --source open-meteo
//!
//! - Latest METAR observation
//!   $ cuaca metar WARR
//!
//! - Fill in missing coordinates of a region table
//!   $ cuaca --regions kode_wilayah.csv enrich -o kode_wilayah_with_coords.csv
mod args;

use crate::args::{CliArgs, Commands, MatchArgs};
use anyhow::{Context, Result};
use clap::Parser;
use cuaca::config::CuacaConfig;
use cuaca::enrich::{EnrichOptions, Enricher, write_csv_file};
use cuaca::forecast_service::{ForecastRequest, ForecastService, MetarChoice, Place};
use cuaca::geocode::NominatimGeocoder;
use cuaca::metar::{self, MetarClient};
use cuaca::models::{Coordinates, RegionCode};
use cuaca::region::{MatchStrategy, RegionQuery, RegionTable, Resolution};
use cuaca::render::render;
use cuaca::summary::Language;
use cuaca::{CuacaError, cache, http, telemetry};
use std::process::ExitCode;
use tracing::{debug, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            debug!("{:?}", e);
            match e.downcast_ref::<CuacaError>() {
                Some(err) => eprintln!("Error: {}", err.user_message()),
                None => eprintln!("Error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: CliArgs) -> Result<ExitCode> {
    let mut config = CuacaConfig::load_from_path(args.config.clone())?;
    if let Some(regions) = &args.regions {
        config.defaults.regions_path = regions.to_string_lossy().into_owned();
    }
    if args.no_cache {
        config.cache.enabled = false;
    }

    telemetry::init(&config.logging, args.verbose)?;
    http::init(&config)?;
    if config.cache.enabled {
        let dir = config.cache_dir();
        let opened = std::fs::create_dir_all(&dir)
            .context("Failed to create cache directory")
            .and_then(|()| cache::init(&dir));
        if let Err(e) = opened {
            warn!("Continuing without cache at {}: {:#}", dir.display(), e);
        }
    }

    match args.command {
        Commands::Search {
            query,
            matching,
            json,
        } => {
            let service = ForecastService::new(config.clone(), load_table(&config)?)?;
            let query = region_query(&query, &matching)?;
            let resolution = service.search(&query, strategy(&config, &matching)?)?;
            print_resolution(&resolution, json)?;
            if let Resolution::NotFound { .. } = resolution {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Forecast {
            query,
            matching,
            pick,
            lat,
            lon,
            source,
            format,
            lang,
            station,
            no_metar,
        } => {
            let place = match (lat, lon, query) {
                (Some(lat), Some(lon), _) => {
                    let coordinates = Coordinates::new(lat, lon)?;
                    Place::Coordinates {
                        name: coordinates.format(),
                        coordinates,
                    }
                }
                (_, _, Some(query)) => Place::Region(region_query(&query, &matching)?),
                _ => {
                    return Err(
                        CuacaError::validation("Give a region name or --lat and --lon").into(),
                    );
                }
            };
            let table = match place {
                Place::Region(_) => load_table(&config)?,
                Place::Coordinates { .. } => RegionTable::default(),
            };
            let service = ForecastService::new(config.clone(), table)?;

            let mut request = ForecastRequest::new(place);
            request.pick = pick;
            request.source = source;
            request.strategy = strategy(&config, &matching)?;
            request.metar = match (no_metar, station) {
                (true, _) => MetarChoice::Off,
                (false, Some(icao)) => MetarChoice::Station(icao),
                (false, None) => MetarChoice::Nearest,
            };
            request.language = match lang {
                Some(code) => Some(Language::from_code(&code).ok_or_else(|| {
                    CuacaError::validation(format!("Unknown language '{code}'. Use id or en"))
                })?),
                None => None,
            };

            if let (Place::Region(query), None) = (&request.place, pick) {
                let resolution = service.search(query, request.strategy)?;
                if let Resolution::Ambiguous { candidates, total } = &resolution {
                    if *total > candidates.len() {
                        eprintln!(
                            "'{}' matches {} regions, showing {} of {}:",
                            query.name,
                            total,
                            candidates.len(),
                            total
                        );
                    } else {
                        eprintln!("'{}' matches {} regions:", query.name, total);
                    }
                    for (i, c) in candidates.iter().enumerate() {
                        eprintln!("  {}. {} [{}]", i + 1, c.context, c.record.code);
                    }
                }
            }

            let report = service.forecast(&request).await?;
            print!("{}", render(&report, format)?);
        }

        Commands::Metar { station, lat, lon } => {
            let icao = match (station, lat, lon) {
                (Some(icao), _, _) => icao,
                (None, Some(lat), Some(lon)) => {
                    let point = Coordinates::new(lat, lon)?;
                    let (station, distance) =
                        metar::nearest_station(&point, config.defaults.metar_max_distance_km)
                            .ok_or_else(|| {
                                CuacaError::validation(format!(
                                    "No METAR station within {} km",
                                    config.defaults.metar_max_distance_km
                                ))
                            })?;
                    println!("{} {} ({:.1} km)", station.icao, station.name, distance);
                    station.icao.to_string()
                }
                _ => return Err(CuacaError::validation("Give a station or --lat and --lon").into()),
            };
            let report = MetarClient::from_config(&config).latest(&icao).await?;
            println!("{}", report.raw);
            if !report.phenomena.is_empty() {
                println!("Phenomena: {}", report.phenomena.join(", "));
            }
        }

        Commands::Enrich { output, region } => {
            let table = load_table(&config)?;
            let mut options = EnrichOptions::from_config(&config);
            if let Some(region) = region {
                options.region = region;
            }
            let geocoder = NominatimGeocoder::from_config(&config);
            let (records, stats) = Enricher::new(&geocoder, options).enrich(&table).await;
            write_csv_file(&records, &output)?;

            println!("Rows:            {}", stats.total);
            println!("Already present: {}", stats.already_present);
            println!("Geocoded:        {}", stats.geocoded);
            println!("Not found:       {}", stats.not_found);
            println!("Failed:          {}", stats.failed);
            println!("Written to {}", output.display());
        }

        Commands::Regions { count, under } => {
            let table = load_table(&config)?;
            match under {
                Some(code) => {
                    let code = RegionCode::parse(&code)?;
                    for child in table.children(&code).into_iter().take(count) {
                        println!("{}  {}", child.code, child.name);
                    }
                }
                None => {
                    println!("{} regions in table; for example:", table.len());
                    for name in table.sample_names(count) {
                        println!("- {name}");
                    }
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn load_table(config: &CuacaConfig) -> Result<RegionTable> {
    let path = config.regions_path();
    let table = RegionTable::load(&path)?;
    if table.is_empty() {
        return Err(CuacaError::data(format!("No usable rows in {}", path.display())).into());
    }
    Ok(table)
}

fn region_query(input: &str, matching: &MatchArgs) -> Result<RegionQuery> {
    let query = RegionQuery::parse(input)?;
    Ok(match &matching.hint {
        Some(hint) => query.with_hint(Some(hint.clone())),
        None => query,
    })
}

/// Strategy from the command line; `None` leaves the configured one
fn strategy(config: &CuacaConfig, matching: &MatchArgs) -> Result<Option<MatchStrategy>> {
    if matching.strategy.is_none() && matching.cutoff.is_none() {
        return Ok(None);
    }
    let name = matching
        .strategy
        .as_deref()
        .unwrap_or(&config.defaults.match_strategy);
    let cutoff = matching.cutoff.unwrap_or(config.defaults.fuzzy_cutoff);
    if !(0.0..=1.0).contains(&cutoff) {
        return Err(CuacaError::validation(format!(
            "Cutoff must be between 0.0 and 1.0, got: {cutoff}"
        ))
        .into());
    }
    Ok(Some(MatchStrategy::from_name(name, cutoff)?))
}

fn print_resolution(resolution: &Resolution, json: bool) -> Result<()> {
    let candidates = resolution.candidates();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&candidates).context("Failed to serialize candidates")?
        );
        return Ok(());
    }
    match resolution {
        Resolution::NotFound { query, hint } => {
            match hint {
                Some(hint) => println!("No region matches '{query}' within '{hint}'"),
                None => println!("No region matches '{query}'"),
            }
        }
        _ => {
            for (i, c) in candidates.iter().enumerate() {
                let coordinates = c
                    .record
                    .coordinates
                    .map_or_else(|| "-".to_string(), |p| p.format());
                println!(
                    "{:>3}. {:<16} {:<9} {}  ({:?}; {})",
                    i + 1,
                    c.record.code.as_str(),
                    c.record.level().label(),
                    c.context,
                    c.kind,
                    coordinates
                );
            }
            if let Resolution::Ambiguous { candidates, total } = resolution {
                if *total > candidates.len() {
                    println!("Showing {} of {} matches; narrow with --hint", candidates.len(), total);
                }
            }
        }
    }
    Ok(())
}
