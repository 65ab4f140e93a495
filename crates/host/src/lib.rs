//! # Tidemark Host
//!
//! Async adapter around `tidemark-reliability`: persists both managers
//! through a [`StateStore`] and drives the retry queue on a `tokio` interval.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tidemark_host::{HostConfig, Monitor};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> tidemark_host::HostResult<()> {
//! let config = HostConfig::load(None)?;
//! let monitor = Arc::new(Monitor::open(&config));
//! monitor.restore(|_record| None).await?;
//!
//! let shutdown = CancellationToken::new();
//! monitor.run(shutdown.child_token()).await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod monitor;
pub mod store;

pub use config::HostConfig;
pub use error::{HostError, HostResult};
pub use monitor::{Monitor, RETRY_QUEUE_KEY, RestoreReport, TIMESTAMP_STATE_KEY, TickReport};
pub use store::{JsonFileStore, MemoryStore, StateStore};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{HostConfig, HostError, HostResult, Monitor, StateStore, TickReport};
    pub use tidemark_reliability::prelude::*;
}
