//! Resolved runtime configuration.
//!
//! Precedence, highest first: process environment (after `.env` is loaded),
//! the settings file, built-in defaults.

mod backend;
pub mod case_types;
pub(crate) mod helpers;
mod logging;

use std::sync::Arc;

pub use backend::BackendConfig;
pub use case_types::{CaseTypeConfig, CaseTypeRegistry};
pub use logging::LoggingConfig;

use crate::config::helpers::parse_string_env;
use crate::error::ConfigError;
use crate::i18n::Language;
use crate::settings::Settings;

/// Everything the application needs to start.
#[derive(Debug)]
pub struct Config {
    pub backend: BackendConfig,
    pub logging: LoggingConfig,
    pub language: Language,
    pub case_types: Arc<CaseTypeRegistry>,
}

impl Config {
    /// Load `.env`, the default settings file, and resolve.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            return Err(ConfigError::ParseError(format!("invalid .env file: {e}")));
        }
        let settings = Settings::load()?;
        Self::resolve(&settings)
    }

    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let language_raw = parse_string_env("CASEFILE_LANGUAGE", settings.ui.language.clone())?;
        let language =
            Language::from_code(&language_raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "CASEFILE_LANGUAGE".to_string(),
                message: format!("unsupported language '{language_raw}', expected 'en' or 'zh'"),
            })?;

        let case_types = match &settings.case_types_path {
            Some(path) => Arc::new(CaseTypeRegistry::load(path)?),
            None => Arc::new(CaseTypeRegistry::bundled()?.clone()),
        };

        Ok(Self {
            backend: BackendConfig::resolve(settings)?,
            logging: LoggingConfig::resolve(settings)?,
            language,
            case_types,
        })
    }
}
