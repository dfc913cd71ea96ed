//! Data models for the cuaca application
//!
//! This module contains the core domain models organized by concern:
//! - Location: geographic coordinates
//! - Region: administrative codes and lookup-table records
//! - Forecast: forecast samples and series

pub mod forecast;
pub mod location;
pub mod region;

// Re-export all public types for convenient access
pub use forecast::{Forecast, ForecastSample, ForecastSource};
pub use location::Coordinates;
pub use region::{AdmLevel, RegionCode, RegionRecord};
