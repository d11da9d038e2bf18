//! Tracing subscriber setup for embedding shells.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::ConfigError;

/// Build the filter: `RUST_LOG` wins over the configured directive.
fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, ConfigError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.filter).map_err(|e| ConfigError::InvalidValue {
        key: "CASEFILE_LOG_FILTER".to_string(),
        message: e.to_string(),
    })
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = build_filter(config)?;
    let result = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    };
    if result.is_err() {
        tracing::debug!("Global tracing subscriber already installed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::config::LoggingConfig;

    #[test]
    fn init_is_idempotent() {
        let config = LoggingConfig::default();
        super::init(&config).expect("first init");
        super::init(&config).expect("second init");
    }
}
