use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::config::helpers::{optional_env, parse_env, parse_string_env};
use crate::error::ConfigError;
use crate::settings::Settings;

/// Connection details for the hosted backend (auth, tables, storage).
#[derive(Debug)]
pub struct BackendConfig {
    pub url: Url,
    pub anon_key: SecretString,
    pub bucket: String,
    /// No timeout unless one is configured.
    pub request_timeout: Option<Duration>,
}

fn validate_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidValue {
        key: "CASEFILE_BACKEND_URL".to_string(),
        message: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            key: "CASEFILE_BACKEND_URL".to_string(),
            message: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    Ok(url)
}

fn validate_bucket(raw: &str) -> Result<String, ConfigError> {
    let bucket = raw.trim();
    if bucket.is_empty() || bucket.contains('/') {
        return Err(ConfigError::InvalidValue {
            key: "CASEFILE_STORAGE_BUCKET".to_string(),
            message: "bucket must be a single non-empty path segment".to_string(),
        });
    }
    Ok(bucket.to_string())
}

impl BackendConfig {
    /// Build a config directly, e.g. for tests or an embedding shell.
    pub fn new(url: &str, anon_key: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            url: validate_url(url)?,
            anon_key: SecretString::from(anon_key.into()),
            bucket: "attachments".to_string(),
            request_timeout: None,
        })
    }

    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let url = optional_env("CASEFILE_BACKEND_URL")?
            .or_else(|| settings.backend.url.clone())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "CASEFILE_BACKEND_URL".to_string(),
                hint: "Set it in the environment or under [backend] url in settings.toml"
                    .to_string(),
            })?;
        let anon_key = optional_env("CASEFILE_BACKEND_ANON_KEY")?
            .or_else(|| settings.backend.anon_key.clone())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "CASEFILE_BACKEND_ANON_KEY".to_string(),
                hint: "Use the project's public anon key".to_string(),
            })?;
        let timeout_secs: Option<u64> = match optional_env("CASEFILE_REQUEST_TIMEOUT_SECS")? {
            Some(_) => Some(parse_env("CASEFILE_REQUEST_TIMEOUT_SECS", 0)?),
            None => settings.backend.request_timeout_secs,
        };
        if timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "CASEFILE_REQUEST_TIMEOUT_SECS".to_string(),
                message: "timeout must be at least one second".to_string(),
            });
        }

        Ok(Self {
            url: validate_url(&url)?,
            anon_key: SecretString::from(anon_key),
            bucket: validate_bucket(&parse_string_env(
                "CASEFILE_STORAGE_BUCKET",
                settings.backend.bucket.clone(),
            )?)?,
            request_timeout: timeout_secs.map(Duration::from_secs),
        })
    }

    /// `{url}/{path}` with exactly one slash between the two.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
