//! Runtime configuration for the section store.
//!
//! # Responsibility
//! - Hold storage and retry tunables with safe defaults.
//! - Read overrides from `SECTIONVAULT_*` environment variables.
//!
//! # Invariants
//! - Invalid environment values never fail startup; defaults are kept and a
//!   warning is logged.

use crate::logging::{default_log_level, normalize_level};
use log::warn;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "SECTIONVAULT_DB_PATH";
pub const ENV_BUSY_TIMEOUT_MS: &str = "SECTIONVAULT_BUSY_TIMEOUT_MS";
pub const ENV_MAX_RETRIES: &str = "SECTIONVAULT_MAX_RETRIES";
pub const ENV_RETRY_BACKOFF_MS: &str = "SECTIONVAULT_RETRY_BACKOFF_MS";
pub const ENV_LOG_LEVEL: &str = "SECTIONVAULT_LOG_LEVEL";

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 5;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(10);
const MAX_CONFLICT_RETRIES_CAP: u32 = 50;

/// Storage and concurrency settings shared by the service and API layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Database file. `None` lets the caller pick a location.
    pub db_path: Option<PathBuf>,
    /// How long a connection waits for the SQLite writer lock.
    pub busy_timeout: Duration,
    /// Additional attempts after a version-number conflict.
    pub max_conflict_retries: u32,
    /// Base delay between conflict retries; grows linearly per attempt.
    pub retry_backoff: Duration,
    /// Log level used when the embedding application initializes logging.
    pub log_level: &'static str,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            log_level: default_log_level(),
        }
    }
}

impl StoreConfig {
    /// Builds a config from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    ///
    /// Unset or blank keys keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(path) = read(ENV_DB_PATH) {
            config.db_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = read(ENV_BUSY_TIMEOUT_MS) {
            match raw.parse::<u64>() {
                Ok(ms) => config.busy_timeout = Duration::from_millis(ms),
                Err(_) => warn_invalid(ENV_BUSY_TIMEOUT_MS, &raw),
            }
        }
        if let Some(raw) = read(ENV_MAX_RETRIES) {
            match raw.parse::<u32>() {
                Ok(value) => config.max_conflict_retries = value.min(MAX_CONFLICT_RETRIES_CAP),
                Err(_) => warn_invalid(ENV_MAX_RETRIES, &raw),
            }
        }
        if let Some(raw) = read(ENV_RETRY_BACKOFF_MS) {
            match raw.parse::<u64>() {
                Ok(ms) => config.retry_backoff = Duration::from_millis(ms),
                Err(_) => warn_invalid(ENV_RETRY_BACKOFF_MS, &raw),
            }
        }
        if let Some(raw) = read(ENV_LOG_LEVEL) {
            match normalize_level(&raw) {
                Ok(level) => config.log_level = level,
                Err(_) => warn_invalid(ENV_LOG_LEVEL, &raw),
            }
        }

        config
    }

    /// Returns a copy with the given database path.
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }
}

fn warn_invalid(key: &str, value: &str) {
    warn!(
        "event=config_load module=config status=fallback key={} value_len={}",
        key,
        value.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = StoreConfig::from_lookup(|_| None);
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            (ENV_DB_PATH, " /tmp/sections.db "),
            (ENV_BUSY_TIMEOUT_MS, "250"),
            (ENV_MAX_RETRIES, "2"),
            (ENV_RETRY_BACKOFF_MS, "0"),
            (ENV_LOG_LEVEL, "WARNING"),
        ]));
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/sections.db")));
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.max_conflict_retries, 2);
        assert_eq!(config.retry_backoff, Duration::ZERO);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            (ENV_BUSY_TIMEOUT_MS, "soon"),
            (ENV_MAX_RETRIES, "-1"),
            (ENV_LOG_LEVEL, "verbose"),
        ]));
        let defaults = StoreConfig::default();
        assert_eq!(config.busy_timeout, defaults.busy_timeout);
        assert_eq!(config.max_conflict_retries, defaults.max_conflict_retries);
        assert_eq!(config.log_level, defaults.log_level);
    }

    #[test]
    fn retry_count_is_capped() {
        let config = StoreConfig::from_lookup(lookup_from(&[(ENV_MAX_RETRIES, "100000")]));
        assert_eq!(config.max_conflict_retries, MAX_CONFLICT_RETRIES_CAP);
    }
}
