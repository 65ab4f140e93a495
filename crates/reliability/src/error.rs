//! Error types for reliability tracking.
//!
//! Operation failures are never errors here: they are recorded as data on the
//! managers. What remains is configuration validation and retry requests that
//! the coordinator declines.

use thiserror::Error;

/// Invalid configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value failed validation
    #[error("Invalid configuration: {message}")]
    Validation {
        /// Error message
        message: String,
    },

    /// An environment variable could not be parsed
    #[error("Invalid value {value:?} for environment variable {var}")]
    Env {
        /// Variable name
        var: String,
        /// Raw value that failed to parse
        value: String,
    },
}

impl ConfigError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an environment parsing error
    pub fn env(var: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Env {
            var: var.into(),
            value: value.into(),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Reasons the coordinator declines to hand out an executor.
///
/// Presentation code may discard these: a declined retry leaves the queue
/// untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryRejected {
    /// No operation with this id is queued
    #[error("Unknown retry operation: {id}")]
    UnknownOperation {
        /// Requested id
        id: String,
    },

    /// The operation reached its retry ceiling
    #[error("Operation {id} reached max retries ({max_retries})")]
    Exhausted {
        /// Operation id
        id: String,
        /// Configured ceiling
        max_retries: u32,
    },

    /// A previous dispatch of this operation has not reported back yet
    #[error("Operation {id} is already being retried")]
    InFlight {
        /// Operation id
        id: String,
    },
}

impl RetryRejected {
    /// Operation id the rejection refers to
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::UnknownOperation { id } | Self::Exhausted { id, .. } | Self::InFlight { id } => id,
        }
    }

    /// True when the operation reached its terminal state
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}
