//! Configuration (spec.md §6 CONFIGURATION).

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::{ExchangeError, Result};

fn default_poll_interval_sec() -> u64 {
    60
}
fn default_poll_max_interval_sec() -> u64 {
    300
}
fn default_poll_increment_sec() -> u64 {
    60
}
fn default_dynamic_poll() -> bool {
    true
}
fn default_heartbeat_grace_sec() -> u64 {
    120
}
fn default_max_records() -> u32 {
    1000
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_read_timeout_ms() -> u64 {
    30_000
}
fn default_retry_count() -> u32 {
    2
}
fn default_retry_interval_ms() -> u64 {
    3_000
}

/// The hard ceiling on records fetched per change page, regardless of
/// configuration (spec.md §4.F step 2).
pub const HARD_MAX_RECORDS_PER_FETCH: u32 = 1000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeConfig {
    /// Base URL of the Exchange API. Required.
    pub exchange_url: String,

    #[serde(default = "default_poll_interval_sec")]
    pub exchange_poll_interval_sec: u64,
    #[serde(default = "default_poll_max_interval_sec")]
    pub exchange_poll_max_interval_sec: u64,
    #[serde(default = "default_poll_increment_sec")]
    pub exchange_poll_increment_sec: u64,
    #[serde(default = "default_dynamic_poll")]
    pub exchange_message_dynamic_poll: bool,
    #[serde(default = "default_heartbeat_grace_sec")]
    pub exchange_heartbeat_grace_sec: u64,
    #[serde(default = "default_max_records")]
    pub max_records_per_change_fetch: u32,

    #[serde(default = "default_connect_timeout_ms")]
    pub http_connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub http_read_timeout_ms: u64,
    #[serde(default = "default_retry_count")]
    pub http_retry_count: u32,
    #[serde(default = "default_retry_interval_ms")]
    pub http_retry_interval_ms: u64,

    /// Path to the local key/value store used for the cursor and identity
    /// (spec.md §6 PERSISTED STATE).
    #[serde(default = "default_store_path")]
    pub store_path: String,
}

fn default_store_path() -> String {
    "exchange-sync.db".to_string()
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            exchange_url: String::new(),
            exchange_poll_interval_sec: default_poll_interval_sec(),
            exchange_poll_max_interval_sec: default_poll_max_interval_sec(),
            exchange_poll_increment_sec: default_poll_increment_sec(),
            exchange_message_dynamic_poll: default_dynamic_poll(),
            exchange_heartbeat_grace_sec: default_heartbeat_grace_sec(),
            max_records_per_change_fetch: default_max_records(),
            http_connect_timeout_ms: default_connect_timeout_ms(),
            http_read_timeout_ms: default_read_timeout_ms(),
            http_retry_count: default_retry_count(),
            http_retry_interval_ms: default_retry_interval_ms(),
            store_path: default_store_path(),
        }
    }
}

impl ExchangeConfig {
    /// Loads configuration from a TOML file on disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ExchangeError::internal(format!("reading config: {e}")))?;
        Self::parse(&text)
    }

    /// Parses configuration from a TOML string.
    pub fn parse(text: &str) -> Result<Self> {
        let cfg: ExchangeConfig =
            toml::from_str(text).map_err(|e| ExchangeError::internal(format!("parsing config: {e}")))?;
        if cfg.exchange_url.is_empty() {
            return Err(ExchangeError::internal("exchangeUrl is required"));
        }
        Ok(cfg)
    }

    pub fn max_records(&self) -> u32 {
        self.max_records_per_change_fetch.min(HARD_MAX_RECORDS_PER_FETCH)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.http_connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.http_read_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.http_retry_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = ExchangeConfig::parse("exchangeUrl = \"https://exchange.example\"").unwrap();
        assert_eq!(cfg.exchange_poll_interval_sec, 60);
        assert_eq!(cfg.exchange_poll_max_interval_sec, 300);
        assert_eq!(cfg.max_records(), 1000);
    }

    #[test]
    fn missing_url_is_rejected() {
        assert!(ExchangeConfig::parse("exchangePollIntervalSec = 10").is_err());
    }

    #[test]
    fn hard_cap_wins_over_configured_max() {
        let cfg = ExchangeConfig::parse(
            "exchangeUrl = \"https://e\"\nmaxRecordsPerChangeFetch = 50000",
        )
        .unwrap();
        assert_eq!(cfg.max_records(), HARD_MAX_RECORDS_PER_FETCH);
    }
}
