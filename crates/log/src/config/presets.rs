//! Configuration presets for common scenarios

use super::{Config, DisplayConfig, Format};
use crate::{Error, Result};

impl Config {
    /// Create configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `TIDEMARK_LOG_UTC_OFFSET_MINUTES` is not an integer
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Create configuration from variables provided by `lookup`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `TIDEMARK_LOG_UTC_OFFSET_MINUTES` is not an integer
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // TIDEMARK_LOG wins over RUST_LOG
        if let Some(level) = lookup("TIDEMARK_LOG").or_else(|| lookup("RUST_LOG")) {
            config.level = level;
        }

        if let Some(format) = lookup("TIDEMARK_LOG_FORMAT") {
            config.format = Format::parse_lossy(&format);
        }

        if let Some(offset) = lookup("TIDEMARK_LOG_UTC_OFFSET_MINUTES") {
            config.display.utc_offset_minutes = offset.trim().parse().map_err(|_| {
                Error::Config(format!("TIDEMARK_LOG_UTC_OFFSET_MINUTES: invalid value {offset:?}"))
            })?;
        }

        config.display.apply_vars(&lookup);
        config.service = lookup("TIDEMARK_SERVICE");

        Ok(config)
    }

    /// Development configuration (pretty, debug level)
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: Format::Pretty,
            display: DisplayConfig {
                colors: true,
                source: true,
                milliseconds: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Production configuration (JSON, info level)
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Json,
            display: DisplayConfig {
                colors: false,
                source: false,
                flatten: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Test configuration (no colors, no timestamps)
    #[must_use]
    pub fn test() -> Self {
        Self {
            level: "trace".to_string(),
            format: Format::Compact,
            display: DisplayConfig {
                colors: false,
                time: false,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }
}
