//! Settings loading and resolution.
//!
//! Defaults, optionally overridden by a JSON file, then by `PRICEWATCH_*`
//! environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fetch::http_client::DEFAULT_USER_AGENT;
use crate::fetch::RetryPolicy;
use crate::types::{Currency, PriceResult, PriceWatchError};

/// Runtime settings shared by every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root for the page cache and the rate file.
    pub data_dir: PathBuf,
    pub cache_ttl_secs: u64,
    pub fetch_attempts: u32,
    pub retry_delay_step_ms: u64,
    /// Wall-clock bound on one download, retries included.
    pub fetch_time_budget_secs: Option<u64>,
    pub request_timeout_ms: u64,
    pub user_agent: String,
    pub main_currency: Currency,
    pub rate_ttl_hours: u64,
    /// Rate file location; `<data_dir>/rates.txt` when unset.
    pub rate_file: Option<PathBuf>,
    /// Pages scanned at once.
    pub concurrency: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            cache_ttl_secs: 12 * 60 * 60,
            fetch_attempts: 10,
            retry_delay_step_ms: 200,
            fetch_time_budget_secs: None,
            request_timeout_ms: 30_000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            main_currency: Currency::Usd,
            rate_ttl_hours: 12,
            rate_file: None,
            concurrency: 4,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pricewatch")
}

impl Settings {
    /// Settings from a JSON file; missing keys take their defaults.
    pub fn load(path: &Path) -> PriceResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Defaults, or `explicit` if given, then environment overrides.
    pub fn resolve(explicit: Option<&Path>) -> PriceResult<Self> {
        let base = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        base.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `PRICEWATCH_*` overrides read through `lookup`.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> PriceResult<Self> {
        if let Some(v) = lookup("PRICEWATCH_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("PRICEWATCH_CACHE_TTL_SECS") {
            self.cache_ttl_secs = parse_env("PRICEWATCH_CACHE_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("PRICEWATCH_FETCH_ATTEMPTS") {
            self.fetch_attempts = parse_env("PRICEWATCH_FETCH_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("PRICEWATCH_RETRY_DELAY_STEP_MS") {
            self.retry_delay_step_ms = parse_env("PRICEWATCH_RETRY_DELAY_STEP_MS", &v)?;
        }
        if let Some(v) = lookup("PRICEWATCH_FETCH_TIME_BUDGET_SECS") {
            self.fetch_time_budget_secs = Some(parse_env("PRICEWATCH_FETCH_TIME_BUDGET_SECS", &v)?);
        }
        if let Some(v) = lookup("PRICEWATCH_MAIN_CURRENCY") {
            self.main_currency = v.parse()?;
        }
        if let Some(v) = lookup("PRICEWATCH_RATE_FILE") {
            self.rate_file = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("PRICEWATCH_CONCURRENCY") {
            self.concurrency = parse_env("PRICEWATCH_CONCURRENCY", &v)?;
        }
        Ok(self)
    }

    pub fn page_cache_dir(&self) -> PathBuf {
        self.data_dir.join("webcache")
    }

    pub fn rate_file_path(&self) -> PathBuf {
        self.rate_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("rates.txt"))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn rate_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.rate_ttl_hours as i64)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.fetch_attempts,
            delay_step: Duration::from_millis(self.retry_delay_step_ms),
            time_budget: self.fetch_time_budget_secs.map(Duration::from_secs),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> PriceResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| PriceWatchError::Configuration(format!("{key}: invalid value '{value}'")))
}
