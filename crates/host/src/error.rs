//! Host error types

use std::path::PathBuf;

use thiserror::Error;
use tidemark_reliability::{ConfigError, RetryRejected};

/// Errors raised by the host adapter.
///
/// Operation failures never show up here; they are recorded as state by the
/// reliability core.
#[derive(Error, Debug)]
pub enum HostError {
    /// Reading or writing persisted state failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// State or configuration could not be (de)serialized
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The coordinator declined a retry request
    #[error(transparent)]
    Rejected(#[from] RetryRejected),
}

impl HostError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for host operations
pub type HostResult<T> = Result<T, HostError>;
