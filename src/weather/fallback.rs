//! Fallback chain over forecast providers
//!
//! Providers are tried in order until one returns a non-empty series. Each
//! try is recorded as an [`Attempt`] so the caller can tell the user which
//! sources were skipped or failed before the forecast was found.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::{
    BmkgLevel, BmkgProvider, ForecastProvider, ForecastTarget, MetNorwayProvider,
    OpenMeteoProvider,
};
use crate::cache;
use crate::config::CuacaConfig;
use crate::error::CuacaError;
use crate::models::Forecast;

/// Which sources the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourcePreference {
    /// BMKG village, BMKG province, Open-Meteo, MET Norway
    #[default]
    Auto,
    Bmkg,
    OpenMeteo,
    MetNorway,
}

impl FromStr for SourcePreference {
    type Err = CuacaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "auto" => Ok(SourcePreference::Auto),
            "bmkg" => Ok(SourcePreference::Bmkg),
            "open-meteo" | "openmeteo" => Ok(SourcePreference::OpenMeteo),
            "met-no" | "metno" | "met-norway" => Ok(SourcePreference::MetNorway),
            other => Err(CuacaError::validation(format!(
                "Unknown source '{other}'. Must be one of: auto, bmkg, open-meteo, met-no"
            ))),
        }
    }
}

impl fmt::Display for SourcePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourcePreference::Auto => "auto",
            SourcePreference::Bmkg => "bmkg",
            SourcePreference::OpenMeteo => "open-meteo",
            SourcePreference::MetNorway => "met-no",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AttemptOutcome {
    Success,
    Failed(String),
    Skipped(String),
}

/// One provider tried by the chain
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    pub provider: String,
    pub outcome: AttemptOutcome,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::Success => write!(f, "{}: ok", self.provider),
            AttemptOutcome::Failed(msg) => write!(f, "{}: failed ({msg})", self.provider),
            AttemptOutcome::Skipped(reason) => write!(f, "{}: skipped ({reason})", self.provider),
        }
    }
}

/// Forecast plus the record of how it was obtained
#[derive(Debug, Clone)]
pub struct FallbackOutcome {
    pub forecast: Forecast,
    pub attempts: Vec<Attempt>,
}

impl FallbackOutcome {
    /// Failures that happened before the successful provider
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.attempts
            .iter()
            .filter(|a| matches!(a.outcome, AttemptOutcome::Failed(_)))
            .map(ToString::to_string)
            .collect()
    }
}

pub struct ForecastChain {
    providers: Vec<Box<dyn ForecastProvider>>,
    ttl: Duration,
}

impl ForecastChain {
    #[must_use]
    pub fn new(providers: Vec<Box<dyn ForecastProvider>>, ttl: Duration) -> Self {
        Self { providers, ttl }
    }

    #[must_use]
    pub fn for_preference(preference: SourcePreference, config: &CuacaConfig) -> Self {
        let bmkg = |level| -> Box<dyn ForecastProvider> {
            Box::new(BmkgProvider::from_config(config, level))
        };
        let providers: Vec<Box<dyn ForecastProvider>> = match preference {
            SourcePreference::Auto => vec![
                bmkg(BmkgLevel::Village),
                bmkg(BmkgLevel::Province),
                Box::new(OpenMeteoProvider::from_config(config)),
                Box::new(MetNorwayProvider::from_config(config)),
            ],
            SourcePreference::Bmkg => vec![bmkg(BmkgLevel::Village), bmkg(BmkgLevel::Province)],
            SourcePreference::OpenMeteo => vec![Box::new(OpenMeteoProvider::from_config(config))],
            SourcePreference::MetNorway => vec![Box::new(MetNorwayProvider::from_config(config))],
        };
        Self::new(
            providers,
            Duration::from_secs(config.cache.forecast_ttl_minutes * 60),
        )
    }

    /// Labels of the providers in order
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.label()).collect()
    }

    #[instrument(skip(self, target), fields(target = %target.name))]
    pub async fn run(&self, target: &ForecastTarget) -> Result<FallbackOutcome, CuacaError> {
        let mut attempts = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            let label = provider.label();

            if let Some(reason) = provider.skip_reason(target) {
                debug!("Skipping {}: {}", label, reason);
                attempts.push(Attempt {
                    provider: label,
                    outcome: AttemptOutcome::Skipped(reason),
                });
                continue;
            }

            match self.fetch_cached(provider.as_ref(), &label, target).await {
                Ok(forecast) if !forecast.is_empty() => {
                    info!("Forecast for {} from {}", target.name, label);
                    attempts.push(Attempt {
                        provider: label,
                        outcome: AttemptOutcome::Success,
                    });
                    return Ok(FallbackOutcome { forecast, attempts });
                }
                Ok(_) => {
                    warn!("{} returned an empty forecast, trying next source", label);
                    attempts.push(Attempt {
                        provider: label,
                        outcome: AttemptOutcome::Failed("empty forecast".to_string()),
                    });
                }
                Err(e) => {
                    warn!("{} failed: {}, trying next source", label, e);
                    attempts.push(Attempt {
                        provider: label,
                        outcome: AttemptOutcome::Failed(e.to_string()),
                    });
                }
            }
        }

        Err(CuacaError::AllSourcesFailed {
            attempts: attempts.iter().map(ToString::to_string).collect(),
        })
    }

    async fn fetch_cached(
        &self,
        provider: &dyn ForecastProvider,
        label: &str,
        target: &ForecastTarget,
    ) -> Result<Forecast, CuacaError> {
        let key = format!("forecast:{}:{}", label, target.key());

        match cache::get::<Forecast>(&key).await {
            Ok(Some(forecast)) => {
                debug!("Forecast cache hit for {}", key);
                return Ok(forecast);
            }
            Ok(None) => {}
            Err(e) => warn!("Forecast cache read failed: {}", e),
        }

        let forecast = provider.fetch(target).await?;
        if !forecast.is_empty() {
            if let Err(e) = cache::put(&key, forecast.clone(), cache::jittered(self.ttl)).await {
                warn!("Forecast cache write failed: {}", e);
            }
        }
        Ok(forecast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coordinates, RegionCode};
    use crate::weather::bmkg::tests::village_body;
    use crate::weather::open_meteo::tests::hourly_body;
    use rstest::rstest;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn target(village: Option<&str>) -> ForecastTarget {
        ForecastTarget {
            name: "Simogirang".into(),
            coordinates: Coordinates::new(-7.46, 112.59).unwrap(),
            village: village.map(|v| RegionCode::parse(v).unwrap()),
            province: Some(RegionCode::parse("35").unwrap()),
        }
    }

    /// One mock server standing in for every upstream
    fn config_for(server: &MockServer) -> CuacaConfig {
        let mut config = CuacaConfig::default();
        config.weather.bmkg_base_url = format!("{}/bmkg", server.uri());
        config.weather.open_meteo_base_url = format!("{}/om", server.uri());
        config.weather.met_no_base_url = format!("{}/met", server.uri());
        config
    }

    #[rstest]
    #[case("auto", SourcePreference::Auto)]
    #[case("BMKG", SourcePreference::Bmkg)]
    #[case("open_meteo", SourcePreference::OpenMeteo)]
    #[case("met-no", SourcePreference::MetNorway)]
    fn test_preference_from_str(#[case] raw: &str, #[case] expected: SourcePreference) {
        assert_eq!(raw.parse::<SourcePreference>().unwrap(), expected);
    }

    #[test]
    fn test_auto_chain_order() {
        let chain = ForecastChain::for_preference(SourcePreference::Auto, &CuacaConfig::default());
        assert_eq!(
            chain.labels(),
            vec!["BMKG (adm4)", "BMKG (adm1)", "Open-Meteo", "MET Norway"]
        );
    }

    #[tokio::test]
    async fn test_bmkg_village_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bmkg"))
            .and(query_param("adm4", "35.15.02.2018"))
            .respond_with(ResponseTemplate::new(200).set_body_json(village_body()))
            .mount(&server)
            .await;

        let config = config_for(&server);
        let chain = ForecastChain::for_preference(SourcePreference::Auto, &config);
        let outcome = chain.run(&target(Some("35.15.02.2018"))).await.unwrap();

        assert_eq!(outcome.forecast.source, crate::models::ForecastSource::Bmkg);
        assert_eq!(outcome.attempts.len(), 1);
        assert!(outcome.warnings().is_empty());
    }

    #[tokio::test]
    async fn test_falls_back_to_open_meteo() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bmkg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/om/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(hourly_body()))
            .mount(&server)
            .await;

        let config = config_for(&server);
        let chain = ForecastChain::for_preference(SourcePreference::Auto, &config);
        let outcome = chain.run(&target(None)).await.unwrap();

        assert_eq!(outcome.forecast.source, crate::models::ForecastSource::OpenMeteo);
        assert!(!outcome.forecast.samples.is_empty());
        let outcomes: Vec<&AttemptOutcome> = outcome.attempts.iter().map(|a| &a.outcome).collect();
        assert!(matches!(outcomes[0], AttemptOutcome::Skipped(_)));
        assert!(matches!(outcomes[1], AttemptOutcome::Failed(_)));
        assert_eq!(outcomes[2], &AttemptOutcome::Success);
        assert_eq!(outcome.warnings().len(), 1);
        assert!(outcome.warnings()[0].starts_with("BMKG (adm1)"));
    }

    #[tokio::test]
    async fn test_province_outside_allow_list_skips_bmkg() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bmkg"))
            .respond_with(ResponseTemplate::new(200).set_body_json(village_body()))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/om/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(hourly_body()))
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        config.weather.bmkg_provinces = vec!["31".into()];
        let chain = ForecastChain::for_preference(SourcePreference::Auto, &config);
        let outcome = chain.run(&target(Some("35.15.02.2018"))).await.unwrap();

        assert_eq!(outcome.forecast.source, crate::models::ForecastSource::OpenMeteo);
        let skipped = AttemptOutcome::Skipped("province 35 is not covered".to_string());
        let outcomes: Vec<&AttemptOutcome> = outcome.attempts.iter().map(|a| &a.outcome).collect();
        assert_eq!(outcomes, vec![&skipped, &skipped, &AttemptOutcome::Success]);
        assert!(outcome.warnings().is_empty());
    }

    #[tokio::test]
    async fn test_empty_series_counts_as_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/om/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "hourly": {"time": []}
            })))
            .mount(&server)
            .await;

        let config = config_for(&server);
        let chain = ForecastChain::for_preference(SourcePreference::OpenMeteo, &config);
        let err = chain.run(&target(None)).await.unwrap_err();
        match err {
            CuacaError::AllSourcesFailed { attempts } => {
                assert_eq!(attempts, vec!["Open-Meteo: failed (empty forecast)".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_all_sources_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let config = config_for(&server);
        let chain = ForecastChain::for_preference(SourcePreference::Auto, &config);
        let err = chain.run(&target(Some("35.15.02.2018"))).await.unwrap_err();
        let CuacaError::AllSourcesFailed { attempts } = err else {
            panic!("expected AllSourcesFailed");
        };
        assert_eq!(attempts.len(), 4);
        assert!(attempts.iter().all(|a| a.contains("failed")));
    }
}
