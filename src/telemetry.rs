//! Logging setup

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Filter used when neither `--verbose` nor `RUST_LOG` says otherwise
fn env_filter(config: &LoggingConfig, verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Initialize tracing; logs go to stderr so stdout stays parseable.
/// A second call is a no-op.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let filter = env_filter(config, verbose);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = if config.format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        tracing::debug!("Logging already initialized: {}", e);
    }

    tracing::debug!("cuaca {} logging initialized", crate::VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_forces_debug() {
        let config = LoggingConfig {
            level: "error".into(),
            format: "pretty".into(),
        };
        assert_eq!(env_filter(&config, true).to_string(), "debug");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LoggingConfig::default();
        assert!(init(&config, false).is_ok());
        assert!(init(&config, false).is_ok());
    }
}
