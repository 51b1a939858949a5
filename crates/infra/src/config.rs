//! Configuration loading and representation.
//!
//! Settings come from `BPGATE_*` environment variables. Every value has a default
//! except the database URL, whose absence selects the in-memory backend.

use std::str::FromStr;

use thiserror::Error;

use bpgate_observability::{LogFormat, LogSettings};

pub const DATABASE_URL: &str = "BPGATE_DATABASE_URL";
pub const DB_MAX_CONNECTIONS: &str = "BPGATE_DB_MAX_CONNECTIONS";
pub const MAX_PAGE_SIZE: &str = "BPGATE_MAX_PAGE_SIZE";
pub const DEFAULT_PAGE_SIZE: &str = "BPGATE_DEFAULT_PAGE_SIZE";
pub const UPSERT_RETRIES: &str = "BPGATE_UPSERT_RETRIES";
pub const LOG_FORMAT: &str = "BPGATE_LOG_FORMAT";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Inconsistent(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    /// Postgres connection string; `None` runs on in-memory stores.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub max_page_size: u32,
    pub default_page_size: u32,
    pub upsert_retries: u32,
    pub log_format: LogFormat,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: 5,
            max_page_size: 1000,
            default_page_size: 50,
            upsert_retries: 1,
            log_format: LogFormat::Json,
        }
    }
}

impl GateConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        if config.database_url.is_none() {
            tracing::warn!("{DATABASE_URL} not set; using in-memory stores");
        }
        Ok(config)
    }

    /// Read the configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = Self {
            database_url: get(DATABASE_URL),
            db_max_connections: parse_or(get(DB_MAX_CONNECTIONS), DB_MAX_CONNECTIONS, defaults.db_max_connections)?,
            max_page_size: parse_or(get(MAX_PAGE_SIZE), MAX_PAGE_SIZE, defaults.max_page_size)?,
            default_page_size: parse_or(get(DEFAULT_PAGE_SIZE), DEFAULT_PAGE_SIZE, defaults.default_page_size)?,
            upsert_retries: parse_or(get(UPSERT_RETRIES), UPSERT_RETRIES, defaults.upsert_retries)?,
            log_format: parse_or(get(LOG_FORMAT), LOG_FORMAT, defaults.log_format)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_page_size == 0 || self.default_page_size == 0 {
            return Err(ConfigError::Inconsistent("page sizes must be positive".to_string()));
        }
        if self.default_page_size > self.max_page_size {
            return Err(ConfigError::Inconsistent(format!(
                "{DEFAULT_PAGE_SIZE} ({}) exceeds {MAX_PAGE_SIZE} ({})",
                self.default_page_size, self.max_page_size
            )));
        }
        if self.db_max_connections == 0 {
            return Err(ConfigError::Inconsistent(format!("{DB_MAX_CONNECTIONS} must be positive")));
        }
        Ok(())
    }

    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            format: self.log_format,
            ..LogSettings::default()
        }
    }
}

fn parse_or<T>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}
