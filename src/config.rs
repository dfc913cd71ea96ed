//! Configuration management for `cuaca`
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::CuacaError;
use crate::region::MatchStrategy;
use crate::summary::Language;
use anyhow::{Context, Result};
use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure for `cuaca`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CuacaConfig {
    /// Forecast API configuration
    #[serde(default)]
    pub weather: WeatherConfig,
    /// Geocoding API configuration
    #[serde(default)]
    pub geocoding: GeocodingConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Default application settings
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// Forecast API configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
    /// Maximum number of retries for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// User-Agent sent with every request (MET Norway and Nominatim require one)
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// BMKG public forecast endpoint
    #[serde(default = "default_bmkg_base_url")]
    pub bmkg_base_url: String,
    #[serde(default = "default_open_meteo_base_url")]
    pub open_meteo_base_url: String,
    #[serde(default = "default_met_no_base_url")]
    pub met_no_base_url: String,
    /// Directory holding `<ICAO>.TXT` METAR reports
    #[serde(default = "default_metar_base_url")]
    pub metar_base_url: String,
    /// Days of hourly forecast to request
    #[serde(default = "default_forecast_days")]
    pub forecast_days: u32,
    /// Province codes BMKG is queried for; empty means all provinces
    #[serde(default)]
    pub bmkg_provinces: Vec<String>,
}

/// Geocoding configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    #[serde(default = "default_geocoding_base_url")]
    pub open_meteo_base_url: String,
    #[serde(default = "default_nominatim_base_url")]
    pub nominatim_base_url: String,
    /// Number of results to request per lookup
    #[serde(default = "default_result_count")]
    pub result_count: u32,
    /// Appended to region names when geocoding ("Prambon, Jawa Timur")
    #[serde(default = "default_region_hint")]
    pub region_hint: String,
    /// Minimum delay between Nominatim requests in milliseconds
    #[serde(default = "default_nominatim_interval")]
    pub nominatim_interval_ms: u64,
}

/// Cache configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Cache directory location
    #[serde(default = "default_cache_location")]
    pub location: String,
    #[serde(default = "default_forecast_ttl")]
    pub forecast_ttl_minutes: u64,
    #[serde(default = "default_geocode_ttl")]
    pub geocode_ttl_hours: u64,
    #[serde(default = "default_metar_ttl")]
    pub metar_ttl_minutes: u64,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Default application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path of the `kode_wilayah` CSV
    #[serde(default = "default_regions_path")]
    pub regions_path: String,
    /// IANA zone used for day segments and tables
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// substring, fuzzy or auto
    #[serde(default = "default_match_strategy")]
    pub match_strategy: String,
    #[serde(default = "default_fuzzy_cutoff")]
    pub fuzzy_cutoff: f64,
    /// Maximum candidates listed for an ambiguous name
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    /// Narrative language (id or en)
    #[serde(default = "default_language")]
    pub language: String,
    /// Maximum distance to a METAR station
    #[serde(default = "default_metar_distance")]
    pub metar_max_distance_km: f64,
}

// Default value functions
fn default_timeout() -> u32 {
    20
}

fn default_max_retries() -> u32 {
    2
}

fn default_user_agent() -> String {
    format!("cuaca/{} (+https://github.com/cuaca-id/cuaca)", crate::VERSION)
}

fn default_bmkg_base_url() -> String {
    "https://cuaca.bmkg.go.id/api/df/v1/forecast/adm".to_string()
}

fn default_open_meteo_base_url() -> String {
    "https://api.open-meteo.com/v1".to_string()
}

fn default_met_no_base_url() -> String {
    "https://api.met.no/weatherapi/locationforecast/2.0".to_string()
}

fn default_metar_base_url() -> String {
    "https://tgftp.nws.noaa.gov/data/observations/metar/stations".to_string()
}

fn default_forecast_days() -> u32 {
    3
}

fn default_geocoding_base_url() -> String {
    "https://geocoding-api.open-meteo.com/v1".to_string()
}

fn default_nominatim_base_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_result_count() -> u32 {
    5
}

fn default_region_hint() -> String {
    "Jawa Timur".to_string()
}

fn default_nominatim_interval() -> u64 {
    1200
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_location() -> String {
    "~/.cache/cuaca".to_string()
}

fn default_forecast_ttl() -> u64 {
    5
}

fn default_geocode_ttl() -> u64 {
    720
}

fn default_metar_ttl() -> u64 {
    10
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_regions_path() -> String {
    "data/kode_wilayah.csv".to_string()
}

fn default_timezone() -> String {
    "Asia/Jakarta".to_string()
}

fn default_match_strategy() -> String {
    "auto".to_string()
}

fn default_fuzzy_cutoff() -> f64 {
    crate::region::resolver::DEFAULT_FUZZY_CUTOFF
}

fn default_max_candidates() -> usize {
    20
}

fn default_language() -> String {
    "id".to_string()
}

fn default_metar_distance() -> f64 {
    100.0
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
            bmkg_base_url: default_bmkg_base_url(),
            open_meteo_base_url: default_open_meteo_base_url(),
            met_no_base_url: default_met_no_base_url(),
            metar_base_url: default_metar_base_url(),
            forecast_days: default_forecast_days(),
            bmkg_provinces: Vec::new(),
        }
    }
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            open_meteo_base_url: default_geocoding_base_url(),
            nominatim_base_url: default_nominatim_base_url(),
            result_count: default_result_count(),
            region_hint: default_region_hint(),
            nominatim_interval_ms: default_nominatim_interval(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            location: default_cache_location(),
            forecast_ttl_minutes: default_forecast_ttl(),
            geocode_ttl_hours: default_geocode_ttl(),
            metar_ttl_minutes: default_metar_ttl(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            regions_path: default_regions_path(),
            timezone: default_timezone(),
            match_strategy: default_match_strategy(),
            fuzzy_cutoff: default_fuzzy_cutoff(),
            max_candidates: default_max_candidates(),
            language: default_language(),
            metar_max_distance_km: default_metar_distance(),
        }
    }
}

impl CuacaConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        // Load from file if path is provided or use default location
        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("config.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // CUACA_WEATHER__TIMEOUT_SECONDS=30 overrides weather.timeout_seconds
        builder = builder.add_source(
            Environment::with_prefix("CUACA")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("weather.bmkg_provinces"),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: CuacaConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        // Apply defaults for missing values
        config.apply_defaults();

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cuaca").join("config.toml"))
    }

    /// Apply default values to missing configuration fields
    pub fn apply_defaults(&mut self) {
        if self.weather.timeout_seconds == 0 {
            self.weather.timeout_seconds = default_timeout();
        }
        if self.weather.user_agent.trim().is_empty() {
            self.weather.user_agent = default_user_agent();
        }
        if self.weather.bmkg_base_url.is_empty() {
            self.weather.bmkg_base_url = default_bmkg_base_url();
        }
        if self.weather.open_meteo_base_url.is_empty() {
            self.weather.open_meteo_base_url = default_open_meteo_base_url();
        }
        if self.weather.met_no_base_url.is_empty() {
            self.weather.met_no_base_url = default_met_no_base_url();
        }
        if self.weather.metar_base_url.is_empty() {
            self.weather.metar_base_url = default_metar_base_url();
        }
        if self.weather.forecast_days == 0 {
            self.weather.forecast_days = default_forecast_days();
        }
        if self.geocoding.open_meteo_base_url.is_empty() {
            self.geocoding.open_meteo_base_url = default_geocoding_base_url();
        }
        if self.geocoding.nominatim_base_url.is_empty() {
            self.geocoding.nominatim_base_url = default_nominatim_base_url();
        }
        if self.geocoding.result_count == 0 {
            self.geocoding.result_count = default_result_count();
        }
        if self.cache.location.is_empty() {
            self.cache.location = default_cache_location();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
        if self.defaults.regions_path.is_empty() {
            self.defaults.regions_path = default_regions_path();
        }
        if self.defaults.timezone.is_empty() {
            self.defaults.timezone = default_timezone();
        }
        if self.defaults.match_strategy.is_empty() {
            self.defaults.match_strategy = default_match_strategy();
        }
        if self.defaults.max_candidates == 0 {
            self.defaults.max_candidates = default_max_candidates();
        }
        if self.defaults.language.is_empty() {
            self.defaults.language = default_language();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        self.validate_urls()?;
        Ok(())
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.weather.timeout_seconds > 300 {
            return Err(CuacaError::config("Request timeout cannot exceed 300 seconds").into());
        }

        if self.weather.max_retries > 10 {
            return Err(CuacaError::config("Max retries cannot exceed 10").into());
        }

        if !(1..=16).contains(&self.weather.forecast_days) {
            return Err(CuacaError::config("Forecast days must be between 1 and 16").into());
        }

        if self.geocoding.result_count > 100 {
            return Err(CuacaError::config("Geocoding result count cannot exceed 100").into());
        }

        if !(0.0..=1.0).contains(&self.defaults.fuzzy_cutoff) {
            return Err(CuacaError::config("Fuzzy cutoff must be between 0.0 and 1.0").into());
        }

        if self.defaults.metar_max_distance_km <= 0.0 {
            return Err(CuacaError::config("METAR station distance must be positive").into());
        }

        if self.cache.geocode_ttl_hours > 24 * 365 {
            return Err(CuacaError::config("Geocode cache TTL cannot exceed one year").into());
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(CuacaError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(CuacaError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        self.timezone()?;
        self.match_strategy()?;
        self.language()?;

        for code in &self.weather.bmkg_provinces {
            if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
                return Err(CuacaError::config(format!(
                    "Invalid BMKG province code '{code}'. Expected digits such as '35'"
                ))
                .into());
            }
        }

        Ok(())
    }

    fn validate_urls(&self) -> Result<()> {
        let urls = [
            ("weather.bmkg_base_url", &self.weather.bmkg_base_url),
            ("weather.open_meteo_base_url", &self.weather.open_meteo_base_url),
            ("weather.met_no_base_url", &self.weather.met_no_base_url),
            ("weather.metar_base_url", &self.weather.metar_base_url),
            ("geocoding.open_meteo_base_url", &self.geocoding.open_meteo_base_url),
            ("geocoding.nominatim_base_url", &self.geocoding.nominatim_base_url),
        ];
        for (key, url) in urls {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(
                    CuacaError::config(format!("{key} must be a valid HTTP or HTTPS URL")).into(),
                );
            }
        }
        Ok(())
    }

    /// Configured display zone
    pub fn timezone(&self) -> Result<Tz, CuacaError> {
        self.defaults.timezone.parse::<Tz>().map_err(|_| {
            CuacaError::config(format!("Unknown timezone '{}'", self.defaults.timezone))
        })
    }

    pub fn match_strategy(&self) -> Result<MatchStrategy, CuacaError> {
        MatchStrategy::from_name(&self.defaults.match_strategy, self.defaults.fuzzy_cutoff)
            .map_err(|e| CuacaError::config(e.to_string()))
    }

    pub fn language(&self) -> Result<Language, CuacaError> {
        Language::from_code(&self.defaults.language).ok_or_else(|| {
            CuacaError::config(format!(
                "Invalid language '{}'. Must be one of: id, en",
                self.defaults.language
            ))
        })
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.weather.timeout_seconds.into())
    }

    /// Cache directory with `~` expanded
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        expand_home(&self.cache.location)
    }

    /// Regions CSV path with `~` expanded
    #[must_use]
    pub fn regions_path(&self) -> PathBuf {
        expand_home(&self.defaults.regions_path)
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
