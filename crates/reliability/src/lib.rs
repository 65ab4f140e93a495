//! # Tidemark Reliability
//!
//! Data-freshness tracking and retry coordination for a dashboard that keeps
//! itself up to date.
//!
//! - **Timestamp tracking**: when the displayed data was last refreshed
//!   successfully, how stale it is, and how many refreshes failed in a row
//! - **Retry queue**: failed operations rescheduled with backoff until they
//!   succeed or hit their retry ceiling
//! - **Formatting**: relative freshness text, retry countdowns and log
//!   timestamps for any presentation layer
//!
//! Both managers are plain state. They read time through an injectable
//! [`Clock`], never spawn tasks and never perform I/O; persistence goes through
//! serializable snapshots.
//!
//! ## Quick Start
//!
//! ```rust
//! use tidemark_reliability::prelude::*;
//!
//! let mut timestamps = TimestampManager::new(TimestampConfig::default());
//! timestamps.update_timestamp(true);
//! assert!(!timestamps.is_stale());
//!
//! let mut retries = RetryCoordinator::new(RetryConfig::default());
//! let executor = executor_fn(|| async { Ok(()) });
//! retries.register(RetryRequest::new(
//!     "fetch-dashboard",
//!     OperationType::DataFetch,
//!     executor,
//!     "connection reset",
//! ));
//! assert_eq!(retries.len(), 1);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod clock;
pub mod config;
pub mod error;
pub mod format;
pub mod retry;
pub mod staleness;
pub mod timestamp;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ReliabilityConfig, RetryConfig, TimestampConfig};
pub use error::{ConfigError, ConfigResult, RetryRejected};
pub use format::DisplayOptions;
pub use retry::{
    Backoff, Dispatch, ExecutorError, JitterPolicy, OperationExecutor, OperationRecord,
    OperationStatus, OperationType, Priority, ReportOutcome, RetryCoordinator, RetryOperation,
    RetryQueueSnapshot, RetryRequest, executor_fn,
};
pub use staleness::{StalenessInfo, WarningLevel};
pub use timestamp::{TimeDifference, TimestampManager, TimestampSnapshot};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::config::{ReliabilityConfig, RetryConfig, TimestampConfig};
    pub use crate::error::RetryRejected;
    pub use crate::format::DisplayOptions;
    pub use crate::retry::{
        Backoff, ExecutorError, OperationType, Priority, RetryCoordinator, RetryRequest,
        executor_fn,
    };
    pub use crate::staleness::WarningLevel;
    pub use crate::timestamp::TimestampManager;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
