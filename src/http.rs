//! Shared HTTP client and request helpers
//!
//! A single `reqwest` client wrapped with retry middleware serves every
//! upstream API. [`init`] configures it from [`CuacaConfig`]; without it a
//! client with default settings is built on first use.

use crate::config::CuacaConfig;
use crate::error::{CuacaError, ErrorCode};
use anyhow::Context;
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

static API_CLIENT: OnceLock<ClientWithMiddleware> = OnceLock::new();

/// Requests slower than this are logged as a warning
const SLOW_REQUEST: Duration = Duration::from_secs(5);

fn build_client(
    timeout: Duration,
    user_agent: &str,
    max_retries: u32,
) -> anyhow::Result<ClientWithMiddleware> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .with_context(|| "Failed to create HTTP client")?;

    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
    Ok(ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build())
}

/// Configure the shared client. Later calls are ignored.
pub fn init(config: &CuacaConfig) -> anyhow::Result<()> {
    let client = build_client(
        config.request_timeout(),
        &config.weather.user_agent,
        config.weather.max_retries,
    )?;
    if API_CLIENT.set(client).is_err() {
        debug!("HTTP client already initialized");
    }
    Ok(())
}

/// The shared client
pub fn client() -> &'static ClientWithMiddleware {
    API_CLIENT.get_or_init(|| {
        let defaults = CuacaConfig::default();
        build_client(
            defaults.request_timeout(),
            &defaults.weather.user_agent,
            defaults.weather.max_retries,
        )
        .unwrap_or_else(|e| {
            warn!("Falling back to a plain HTTP client: {:#}", e);
            ClientBuilder::new(reqwest::Client::new()).build()
        })
    })
}

/// GET `url` and return the successful response
#[instrument(level = "debug", skip(url), fields(url = %url))]
pub async fn get(url: &str) -> Result<reqwest::Response, CuacaError> {
    let start = Instant::now();
    debug!("HTTP GET {}", url);

    let response = client().get(url).send().await.map_err(|e| {
        CuacaError::api_with_context(
            format!("Request failed: {e}"),
            ErrorCode::ApiNetworkError,
            HashMap::from([("url".to_string(), url.to_string())]),
        )
    })?;

    let status = response.status();
    let elapsed = start.elapsed();
    debug!("HTTP response {} in {:.3}s", status, elapsed.as_secs_f64());
    if elapsed > SLOW_REQUEST {
        warn!("Slow API response detected: {:.3}s", elapsed.as_secs_f64());
    }

    if status.is_success() {
        return Ok(response);
    }

    let code = if status == StatusCode::TOO_MANY_REQUESTS {
        ErrorCode::ApiRateLimit
    } else if status == StatusCode::NOT_FOUND {
        ErrorCode::ApiNoData
    } else {
        ErrorCode::ApiNetworkError
    };
    Err(CuacaError::api_with_context(
        format!("HTTP {status}"),
        code,
        HashMap::from([("url".to_string(), url.to_string())]),
    ))
}

/// GET `url` and decode the JSON body
pub async fn get_json<T: DeserializeOwned>(url: &str) -> Result<T, CuacaError> {
    let start = Instant::now();
    let response = get(url).await?;
    let parsed = response.json::<T>().await.map_err(|e| {
        CuacaError::api_with_context(
            format!("Invalid response body: {e}"),
            ErrorCode::ApiInvalidResponse,
            HashMap::from([("url".to_string(), url.to_string())]),
        )
    })?;
    info!("Fetched {} in {:.3}s", url, start.elapsed().as_secs_f64());
    Ok(parsed)
}

/// GET `url` and return the body as text
pub async fn get_text(url: &str) -> Result<String, CuacaError> {
    let response = get(url).await?;
    response.text().await.map_err(|e| {
        CuacaError::api_with_context(
            format!("Failed to read response body: {e}"),
            ErrorCode::ApiInvalidResponse,
            HashMap::from([("url".to_string(), url.to_string())]),
        )
    })
}

/// Sliding-window rate limiter: at most `max_requests` per `window`
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    /// Request timestamps within the current window
    request_times: Vec<Instant>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            request_times: Vec::new(),
        }
    }

    /// Check if a request is allowed and record it
    pub fn allow_request(&mut self) -> bool {
        self.cleanup_old_requests();

        if self.request_times.len() >= self.max_requests {
            false
        } else {
            self.request_times.push(Instant::now());
            true
        }
    }

    /// Get time until next request is allowed
    pub fn time_until_next_request(&mut self) -> Duration {
        self.cleanup_old_requests();

        if self.request_times.len() < self.max_requests {
            return Duration::ZERO;
        }
        self.request_times
            .first()
            .map_or(Duration::ZERO, |oldest| {
                self.window.saturating_sub(oldest.elapsed())
            })
    }

    fn cleanup_old_requests(&mut self) {
        let window = self.window;
        self.request_times.retain(|time| time.elapsed() < window);
    }
}

/// Wait until `limiter` admits a request. The lock is never held across
/// an await point.
pub async fn acquire(limiter: &Mutex<RateLimiter>) {
    loop {
        let wait = {
            let mut guard = match limiter.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if guard.allow_request() {
                return;
            }
            guard.time_until_next_request()
        };
        debug!("Rate limit reached, waiting {:.2}s", wait.as_secs_f64());
        tokio::time::sleep(wait.max(Duration::from_millis(10))).await;
    }
}
