//! User settings persisted as TOML.
//!
//! Settings are the lowest-precedence configuration layer: `Config::resolve`
//! reads them first and then applies environment overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backend: BackendSettings,
    pub logging: LoggingSettings,
    pub ui: UiSettings,
    /// Replaces the bundled case-type table when set.
    pub case_types_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub bucket: String,
    /// Unset means requests run until the transport gives up.
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    pub language: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendSettings::default(),
            logging: LoggingSettings::default(),
            ui: UiSettings::default(),
            case_types_path: None,
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            bucket: "attachments".to_string(),
            request_timeout_secs: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "casefile=info".to_string(),
            json: false,
        }
    }
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            language: "zh".to_string(),
        }
    }
}

impl Settings {
    /// Default settings file location (`$CONFIG_DIR/casefile/settings.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("casefile").join("settings.toml"))
    }

    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No settings file at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Self::from_toml(&raw)
    }

    /// Load settings from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::ParseError(format!("invalid settings: {e}")))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(format!("failed to serialize settings: {e}")))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, raw)?;
        Ok(())
    }
}
