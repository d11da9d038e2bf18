use crate::config::helpers::{parse_bool_env, parse_string_env};
use crate::error::ConfigError;
use crate::settings::Settings;

/// Log output controls.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "casefile=info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let filter = parse_string_env("CASEFILE_LOG_FILTER", settings.logging.filter.clone())?;
        if filter.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "CASEFILE_LOG_FILTER".to_string(),
                message: "filter must not be empty".to_string(),
            });
        }
        Ok(Self {
            filter,
            json: parse_bool_env("CASEFILE_LOG_JSON", settings.logging.json)?,
        })
    }
}
