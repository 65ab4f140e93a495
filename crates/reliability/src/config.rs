//! Configuration for the timestamp manager and the retry coordinator.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::retry::{Backoff, JitterPolicy};

/// Default staleness threshold in minutes
pub const DEFAULT_STALENESS_THRESHOLD_MINUTES: u32 = 15;

/// Default number of consecutive failures before refreshes are suspended
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Default retry ceiling for registered operations
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Timestamp manager settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimestampConfig {
    /// Minutes after which data counts as stale (clamped to at least 1)
    pub staleness_threshold_minutes: u32,
    /// Consecutive failures after which refreshes should be suspended
    pub max_consecutive_failures: u32,
    /// Offset from UTC, in minutes, used for log timestamps
    pub log_utc_offset_minutes: i32,
}

impl Default for TimestampConfig {
    fn default() -> Self {
        Self {
            staleness_threshold_minutes: DEFAULT_STALENESS_THRESHOLD_MINUTES,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            log_utc_offset_minutes: 0,
        }
    }
}

impl TimestampConfig {
    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::validation(
                "max_consecutive_failures must be positive",
            ));
        }
        if self.log_offset().is_none() {
            return Err(ConfigError::validation(
                "log_utc_offset_minutes must be within +/- 24 hours",
            ));
        }
        Ok(())
    }

    /// Log offset as a chrono offset; `None` when out of range
    #[must_use]
    pub fn log_offset(&self) -> Option<FixedOffset> {
        tidemark_log::utc_offset(self.log_utc_offset_minutes)
    }
}

/// Retry coordinator defaults, applied when a request does not override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retry ceiling
    pub max_retries: u32,
    /// Backoff policy
    pub backoff: Backoff,
    /// Jitter applied to every computed delay
    pub jitter: JitterPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::default(),
            jitter: JitterPolicy::None,
        }
    }
}

impl RetryConfig {
    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_retries == 0 {
            return Err(ConfigError::validation("max_retries must be positive"));
        }
        self.backoff.validate()
    }
}

/// Combined configuration for the reliability core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliabilityConfig {
    /// Timestamp manager settings
    pub timestamp: TimestampConfig,
    /// Retry coordinator settings
    pub retry: RetryConfig,
}

impl ReliabilityConfig {
    /// Defaults overridden by `TIDEMARK_*` environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by variables from `lookup`
    pub fn from_vars<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_vars(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields with variables from `lookup`
    ///
    /// Recognised variables: `TIDEMARK_STALENESS_MINUTES`,
    /// `TIDEMARK_MAX_CONSECUTIVE_FAILURES`, `TIDEMARK_LOG_UTC_OFFSET_MINUTES`,
    /// `TIDEMARK_MAX_RETRIES`. Does not validate.
    pub fn apply_vars<F>(&mut self, lookup: &F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_var(lookup, "TIDEMARK_STALENESS_MINUTES")? {
            self.timestamp.staleness_threshold_minutes = value;
        }
        if let Some(value) = parse_var(lookup, "TIDEMARK_MAX_CONSECUTIVE_FAILURES")? {
            self.timestamp.max_consecutive_failures = value;
        }
        if let Some(value) = parse_var(lookup, "TIDEMARK_LOG_UTC_OFFSET_MINUTES")? {
            self.timestamp.log_utc_offset_minutes = value;
        }
        if let Some(value) = parse_var(lookup, "TIDEMARK_MAX_RETRIES")? {
            self.retry.max_retries = value;
        }
        Ok(())
    }

    /// Validate every section
    pub fn validate(&self) -> ConfigResult<()> {
        self.timestamp.validate()?;
        self.retry.validate()
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> ConfigResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse() {
            Ok(value) => Ok(Some(value)),
            Err(_) => Err(ConfigError::env(name, raw)),
        },
    }
}
