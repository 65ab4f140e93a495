//! # Tidemark Log
//!
//! Logging bootstrap shared by tidemark binaries and tests.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tidemark_log::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let _guard = tidemark_log::auto_init()?;
//!
//!     info!(interval_ms = 5000, "Monitor starting");
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod builder;
mod config;
mod format;

// Public API
pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, DisplayConfig, Format, WriterConfig};
pub use format::{LogTimer, utc_offset};

/// Prelude for common imports
pub mod prelude {
    pub use crate::{Result, auto_init, debug, error, info, init, init_with, trace, warn};

    pub use tracing::{Span, field};
}

// Re-export tracing macros
pub use tracing::{debug, error, info, instrument, span, trace, warn};

/// Result type for logger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for logger operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filter parsing error
    #[error("Invalid filter: {0}")]
    Filter(String),

    /// Global subscriber could not be installed
    #[error("Failed to install subscriber: {0}")]
    Init(String),
}

// ============================================================================
// Initialization Functions
// ============================================================================

/// Auto-detect and initialize the best logging configuration
///
/// # Errors
///
/// Fails on an invalid filter or when a subscriber is already installed
pub fn auto_init() -> Result<LoggerGuard> {
    if std::env::var("TIDEMARK_LOG").is_ok() || std::env::var("RUST_LOG").is_ok() {
        init_with(Config::from_env()?)
    } else if cfg!(debug_assertions) {
        init_with(Config::development())
    } else {
        init_with(Config::production())
    }
}

/// Initialize with default configuration
///
/// # Errors
///
/// Fails when a subscriber is already installed
pub fn init() -> Result<LoggerGuard> {
    init_with(Config::default())
}

/// Initialize with custom configuration
///
/// # Errors
///
/// Fails on an invalid filter or when a subscriber is already installed
pub fn init_with(config: Config) -> Result<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}

/// Initialize for tests; a no-op once any subscriber is installed
///
/// # Errors
///
/// Never fails in practice; the signature matches the other initializers
pub fn init_test() -> Result<LoggerGuard> {
    if tracing::dispatcher::has_been_set() {
        return Ok(LoggerGuard::noop());
    }
    match init_with(Config::test()) {
        // Another test thread won the race
        Err(Error::Init(_)) => Ok(LoggerGuard::noop()),
        other => other,
    }
}
