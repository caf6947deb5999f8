//! Typed configuration from environment variables or a TOML file.
//!
//! Loads once at startup and fails fast on missing or malformed values.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::storage::StoreOptions;

const DEFAULT_BATCH_SIZE: usize = 1000;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Store file.
    pub database_path: PathBuf,
    /// Rows fetched per export batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default)]
    pub otel_endpoint: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `WORKDB_PATH` is required. In local dev, call `dotenvy::dotenv().ok()`
    /// before this.
    pub fn from_env() -> Result<Self> {
        Self::for_path(required_var("WORKDB_PATH")?)
    }

    /// Use an explicit store path; the remaining settings come from the
    /// environment.
    pub fn for_path(path: impl Into<PathBuf>) -> Result<Self> {
        let config = Self {
            database_path: path.into(),
            batch_size: parsed_var("WORKDB_BATCH_SIZE")?.unwrap_or(DEFAULT_BATCH_SIZE),
            busy_timeout_ms: parsed_var("WORKDB_BUSY_TIMEOUT_MS")?
                .unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| default_log_level()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file with the same keys as the struct.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("bad config file {}: {e}", path.display())))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            ..StoreOptions::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid {name}={raw}: {e}"))),
        Err(_) => Ok(None),
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_fills_defaults() {
        let config = Config::from_toml_str(r#"database_path = "work.db""#).unwrap();
        assert_eq!(config.database_path, PathBuf::from("work.db"));
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.busy_timeout_ms, 5000);
        assert_eq!(config.otel_endpoint, None);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn toml_rejects_zero_batch_size() {
        let result = Config::from_toml_str("database_path = \"work.db\"\nbatch_size = 0");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn toml_rejects_unknown_keys() {
        let result = Config::from_toml_str("database_path = \"work.db\"\nbatchsize = 10");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn store_options_carry_busy_timeout() {
        let config =
            Config::from_toml_str("database_path = \"work.db\"\nbusy_timeout_ms = 250").unwrap();
        assert_eq!(config.store_options().busy_timeout, Duration::from_millis(250));
    }
}
