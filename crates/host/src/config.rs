//! Host configuration: file first, then `TIDEMARK_*` overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tidemark_reliability::{ConfigError, ReliabilityConfig};

use crate::error::{HostError, HostResult};

/// Default directory for persisted state
pub const DEFAULT_STATE_DIR: &str = ".tidemark";

/// Default interval between monitor ticks
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 5_000;

/// Configuration of a [`Monitor`](crate::Monitor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Directory holding the persisted snapshots
    pub state_dir: PathBuf,
    /// Milliseconds between ticks of the polling loop
    pub tick_interval_ms: u64,
    /// Reliability core settings
    pub reliability: ReliabilityConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            reliability: ReliabilityConfig::default(),
        }
    }
}

impl HostConfig {
    /// Load from an optional JSON file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> HostResult<Self> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// Load from an optional JSON file, then apply overrides from `lookup`
    ///
    /// Host variables: `TIDEMARK_STATE_DIR`, `TIDEMARK_TICK_INTERVAL_MS`.
    /// Reliability variables are documented on [`ReliabilityConfig::apply_vars`].
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> HostResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(dir) = lookup("TIDEMARK_STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("TIDEMARK_TICK_INTERVAL_MS") {
            config.tick_interval_ms = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::env("TIDEMARK_TICK_INTERVAL_MS", raw.as_str()))?;
        }
        config.reliability.apply_vars(&lookup)?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config file; missing fields take their defaults
    pub fn from_file(path: &Path) -> HostResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| HostError::io(path, e))?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> HostResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::validation("tick_interval_ms must be positive").into());
        }
        self.reliability.validate()?;
        Ok(())
    }

    /// Interval between ticks
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HostConfig::load_with(None, lookup(&[])).unwrap();
        assert_eq!(config, HostConfig::default());
        assert_eq!(config.tick_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tidemark.json");
        std::fs::write(
            &path,
            r#"{
                "state_dir": "/var/lib/tidemark",
                "tick_interval_ms": 1000,
                "reliability": { "timestamp": { "staleness_threshold_minutes": 30 } }
            }"#,
        )
        .unwrap();

        let config = HostConfig::load_with(
            Some(&path),
            lookup(&[
                ("TIDEMARK_TICK_INTERVAL_MS", "250"),
                ("TIDEMARK_MAX_RETRIES", "8"),
            ]),
        )
        .unwrap();

        assert_eq!(config.state_dir, PathBuf::from("/var/lib/tidemark"));
        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.reliability.timestamp.staleness_threshold_minutes, 30);
        assert_eq!(config.reliability.retry.max_retries, 8);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            HostConfig::load_with(None, lookup(&[("TIDEMARK_TICK_INTERVAL_MS", "0")])),
            Err(HostError::Config(ConfigError::Validation { .. }))
        ));
        assert!(matches!(
            HostConfig::load_with(None, lookup(&[("TIDEMARK_TICK_INTERVAL_MS", "soon")])),
            Err(HostError::Config(ConfigError::Env { .. }))
        ));
        assert!(matches!(
            HostConfig::load_with(Some(Path::new("/nonexistent/tidemark.json")), lookup(&[])),
            Err(HostError::Io { .. })
        ));
    }
}
