//! Process-wide tracing subscriber. `log` records from dependencies are
//! bridged in through `tracing-log`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Builds the filter: `RUST_LOG` wins over the configured level.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. Returns false if one was already set.
pub fn init(config: &LoggingConfig) -> bool {
    // Ignore the error: a logger may already be installed (tests).
    let _ = tracing_log::LogTracer::init();

    let filter = env_filter(config);
    let result = if config.json {
        tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(fmt::layer().json().with_target(true))
                .with(filter),
        )
    } else {
        tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_thread_names(true))
                .with(filter),
        )
    };

    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_filter_falls_back_on_bad_level() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "agritrack=loudest".to_string(),
            json: false,
        };
        assert_eq!(env_filter(&config).to_string(), "info");
    }

    #[test]
    #[serial]
    fn test_env_filter_uses_configured_level() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "agritrack=debug".to_string(),
            json: false,
        };
        assert_eq!(env_filter(&config).to_string(), "agritrack=debug");
    }
}
