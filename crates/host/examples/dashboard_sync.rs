//! Keeps a simulated dashboard fresh: one flaky fetch, retried until it lands.
//!
//! Run with `cargo run -p tidemark-host --example dashboard_sync`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use tidemark_host::{HostConfig, Monitor};
use tidemark_reliability::retry::OperationExecutor;
use tidemark_reliability::{
    Backoff, DisplayOptions, ExecutorError, OperationRecord, OperationType, Priority,
    RetryRequest, executor_fn,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Fetch that fails twice before succeeding
fn flaky_fetch() -> Arc<dyn OperationExecutor> {
    let attempts = Arc::new(AtomicUsize::new(0));
    executor_fn(move || {
        let attempts = Arc::clone(&attempts);
        async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt < 3 {
                Err(ExecutorError::new(format!("gateway timeout (attempt {attempt})")))
            } else {
                Ok(())
            }
        }
    })
}

fn resolve(record: &OperationRecord) -> Option<Arc<dyn OperationExecutor>> {
    match record.operation_type {
        OperationType::DataFetch => Some(flaky_fetch()),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = tidemark_log::auto_init()?;

    let state_dir = std::env::temp_dir().join("tidemark-dashboard-sync");
    let mut config = HostConfig::load(None)?;
    config.state_dir = state_dir;
    config.tick_interval_ms = 250;
    config.reliability.retry.backoff = Backoff::fixed(Duration::from_millis(500));

    let monitor = Arc::new(Monitor::open(&config));
    let restored = monitor.restore(resolve).await?;
    info!(?restored, "Monitor ready");

    if monitor.with_retries(|r| r.get("dashboard").is_none()) {
        monitor.record_refresh(false).await?;
        monitor
            .register_failure(
                RetryRequest::new("dashboard", OperationType::DataFetch, flaky_fetch(), "gateway timeout")
                    .priority(Priority::High)
                    .metadata("endpoint", "/api/dashboard"),
            )
            .await?;
    }

    let shutdown = CancellationToken::new();
    let runner = tokio::spawn({
        let monitor = Arc::clone(&monitor);
        let shutdown = shutdown.clone();
        async move { monitor.run(shutdown).await }
    });

    for _ in 0..8 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        info!(
            updated = %monitor.display_time(DisplayOptions::default().with_seconds()),
            countdown = ?monitor.countdown("dashboard"),
            staleness = %monitor.staleness().message,
            "Dashboard status"
        );
    }

    shutdown.cancel();
    runner.await??;
    Ok(())
}
