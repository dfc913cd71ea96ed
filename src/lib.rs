//! `cuaca` - weather forecasts for Indonesian administrative regions
//!
//! Resolves a place name against the `kode_wilayah` region table, derives
//! coordinates when the table has none, fetches a forecast from BMKG,
//! Open-Meteo or MET Norway (falling back from one to the next), and renders
//! a narrative, an hourly table, a chart or a map marker.

pub mod cache;
pub mod config;
pub mod enrich;
pub mod error;
pub mod forecast_service;
pub mod geocode;
pub mod http;
pub mod location_resolver;
pub mod metar;
pub mod models;
pub mod region;
pub mod render;
pub mod summary;
pub mod telemetry;
pub mod weather;

// Re-export core types for public API
pub use config::CuacaConfig;
pub use error::{CuacaError, ErrorCode};
pub use forecast_service::{ForecastRequest, ForecastService, Place};
pub use location_resolver::{CoordinateSource, LocationResolver, ResolvedLocation};
pub use models::{Coordinates, Forecast, ForecastSample, ForecastSource, RegionCode, RegionRecord};
pub use region::{RegionQuery, RegionResolver, RegionTable, Resolution};
pub use render::{ForecastReport, OutputFormat};
pub use weather::{ForecastChain, SourcePreference};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, CuacaError>;
