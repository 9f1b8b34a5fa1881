//! Tracing subscriber setup

use drivemirror_core::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Builds the filter: `RUST_LOG` wins, otherwise the configured level
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Installs the global subscriber, as plain text or one JSON object per line
pub fn init(config: &LoggingConfig) {
    let filter = env_filter(&config.level);

    if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}
