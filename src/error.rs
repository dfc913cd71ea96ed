//! Error types and handling for the `cuaca` application

use std::collections::HashMap;
use thiserror::Error;

/// Machine-readable classification of API failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Transport failure or non-success status from a remote service
    ApiNetworkError,
    /// Remote service answered with a body we could not understand
    ApiInvalidResponse,
    /// Remote service answered but had nothing for the request
    ApiNoData,
    /// Remote service throttled us
    ApiRateLimit,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ApiNetworkError => "api_network_error",
            ErrorCode::ApiInvalidResponse => "api_invalid_response",
            ErrorCode::ApiNoData => "api_no_data",
            ErrorCode::ApiRateLimit => "api_rate_limit",
        }
    }
}

/// Main error type for the `cuaca` application
#[derive(Error, Debug)]
pub enum CuacaError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// API communication errors
    #[error("API error: {message}")]
    Api {
        message: String,
        code: ErrorCode,
        context: HashMap<String, String>,
    },

    /// Input validation errors
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// Malformed region table or other local data
    #[error("Data error: {message}")]
    Data { message: String },

    /// Cache operation errors
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// No coordinates could be derived for a region
    #[error("Location not found: {name}")]
    LocationNotFound { name: String },

    /// Every forecast source in the fallback chain failed or was skipped
    #[error("All forecast sources failed: {}", .attempts.join("; "))]
    AllSourcesFailed { attempts: Vec<String> },
}

impl CuacaError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new API error without extra context
    pub fn api<S: Into<String>>(message: S, code: ErrorCode) -> Self {
        Self::api_with_context(message, code, HashMap::new())
    }

    /// Create a new API error carrying request context (coordinates, status, ...)
    pub fn api_with_context<S: Into<String>>(
        message: S,
        code: ErrorCode,
        context: HashMap<String, String>,
    ) -> Self {
        Self::Api {
            message: message.into(),
            code,
            context,
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new data error
    pub fn data<S: Into<String>>(message: S) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Create a new cache error
    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    pub fn location_not_found<S: Into<String>>(name: S) -> Self {
        Self::LocationNotFound { name: name.into() }
    }

    /// Error code of an API error, if this is one
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            CuacaError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            CuacaError::Config { message } => {
                format!("Configuration error: {message}. Please check your config file.")
            }
            CuacaError::Api { .. } => {
                "Unable to reach the weather or geocoding service. Please check your internet connection."
                    .to_string()
            }
            CuacaError::Validation { message } => format!("Invalid input: {message}"),
            CuacaError::Data { message } => format!("Region table problem: {message}"),
            CuacaError::Cache { .. } => {
                "Cache operation failed. Run with --no-cache or remove the cache directory."
                    .to_string()
            }
            CuacaError::Io { .. } => {
                "File operation failed. Please check the path and file permissions.".to_string()
            }
            CuacaError::LocationNotFound { name } => format!(
                "Could not determine coordinates for '{name}'. Try another spelling or add the regency/city name."
            ),
            CuacaError::AllSourcesFailed { .. } => {
                "Forecast data is not available (every source failed).".to_string()
            }
        }
    }
}
