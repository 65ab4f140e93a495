//! Polling host around the reliability managers.
//!
//! The monitor owns both managers behind `parking_lot` mutexes. Locks are
//! taken for single synchronous transitions only and are never held across an
//! `.await`; executors are the only suspension point.
//!
//! Writes to the store are serialized by an async persist lock. Each persist
//! exports both managers while holding it, so a later write always carries
//! state at least as new as an earlier one.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tidemark_reliability::retry::{Dispatch, ExecutorError, OperationExecutor};
use tidemark_reliability::{
    Clock, DisplayOptions, OperationRecord, ReportOutcome, RetryCoordinator, RetryQueueSnapshot,
    RetryRequest, StalenessInfo, SystemClock, TimestampManager, TimestampSnapshot, WarningLevel,
};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HostConfig;
use crate::error::HostResult;
use crate::store::{JsonFileStore, StateStore};

/// Store key of the timestamp snapshot
pub const TIMESTAMP_STATE_KEY: &str = "timestamp-state";

/// Store key of the retry queue snapshot
pub const RETRY_QUEUE_KEY: &str = "retry-queue";

/// What a [`Monitor::restore`] call found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// A timestamp snapshot was loaded
    pub timestamps_restored: bool,
    /// Queued operations restored with a resolved executor
    pub operations_restored: usize,
}

/// Outcome counts of one [`Monitor::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Operations dispatched this tick
    pub dispatched: usize,
    /// Eligible data refreshes held back while refreshes are suspended
    pub held_back: usize,
    /// Operations that succeeded and left the queue
    pub completed: usize,
    /// Operations that failed and were rescheduled
    pub rescheduled: usize,
    /// Operations that reached their retry ceiling
    pub exhausted: usize,
    /// Results dropped because the operation was cancelled or replaced
    pub discarded: usize,
    /// Freshness after the tick
    pub warning_level: WarningLevel,
    /// Consecutive refresh failures reached the suspension limit
    pub suspended: bool,
}

impl TickReport {
    fn count(&mut self, outcome: ReportOutcome) {
        match outcome {
            ReportOutcome::Completed => self.completed += 1,
            ReportOutcome::Rescheduled => self.rescheduled += 1,
            ReportOutcome::Exhausted => self.exhausted += 1,
            ReportOutcome::Discarded => self.discarded += 1,
        }
    }
}

/// Persists and drives a [`TimestampManager`] and a [`RetryCoordinator`].
pub struct Monitor {
    timestamps: Mutex<TimestampManager>,
    retries: Mutex<RetryCoordinator>,
    warning_level: Mutex<WarningLevel>,
    persist_lock: AsyncMutex<()>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("timestamps", &*self.timestamps.lock())
            .field("retries", &*self.retries.lock())
            .field("tick_interval", &self.tick_interval)
            .finish_non_exhaustive()
    }
}

impl Monitor {
    /// Monitor persisting JSON files under `config.state_dir`
    #[must_use]
    pub fn open(config: &HostConfig) -> Self {
        Self::new(config, Arc::new(JsonFileStore::new(&config.state_dir)))
    }

    /// Monitor persisting into `store`, reading the system clock
    #[must_use]
    pub fn new(config: &HostConfig, store: Arc<dyn StateStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Monitor persisting into `store`, reading `clock`
    #[must_use]
    pub fn with_clock(config: &HostConfig, store: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Self {
        let timestamps =
            TimestampManager::with_clock(config.reliability.timestamp.clone(), Arc::clone(&clock));
        let retries =
            RetryCoordinator::with_clock(config.reliability.retry.clone(), Arc::clone(&clock));
        let warning_level = timestamps.staleness_info().warning_level;

        Self {
            timestamps: Mutex::new(timestamps),
            retries: Mutex::new(retries),
            warning_level: Mutex::new(warning_level),
            persist_lock: AsyncMutex::new(()),
            store,
            clock,
            tick_interval: config.tick_interval(),
        }
    }

    /// Clock shared by both managers
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Read the timestamp manager
    pub fn with_timestamps<R>(&self, f: impl FnOnce(&TimestampManager) -> R) -> R {
        f(&self.timestamps.lock())
    }

    /// Read the retry coordinator
    pub fn with_retries<R>(&self, f: impl FnOnce(&RetryCoordinator) -> R) -> R {
        f(&self.retries.lock())
    }

    /// Current freshness classification
    #[must_use]
    pub fn staleness(&self) -> StalenessInfo {
        self.timestamps.lock().staleness_info()
    }

    /// Relative freshness text
    #[must_use]
    pub fn display_time(&self, options: DisplayOptions) -> String {
        self.timestamps.lock().display_time(options)
    }

    /// Countdown text for a queued operation
    #[must_use]
    pub fn countdown(&self, id: &str) -> Option<String> {
        let now = self.clock.now();
        self.retries.lock().countdown(id, now)
    }

    /// Load persisted snapshots, resolving an executor for each queued record.
    ///
    /// Missing snapshots leave fresh state; corrupt ones are logged and
    /// ignored. Store I/O errors propagate.
    pub async fn restore<F>(&self, resolve: F) -> HostResult<RestoreReport>
    where
        F: FnMut(&OperationRecord) -> Option<Arc<dyn OperationExecutor>>,
    {
        let mut report = RestoreReport::default();

        if let Some(contents) = self.store.read(TIMESTAMP_STATE_KEY).await? {
            match serde_json::from_str::<TimestampSnapshot>(&contents) {
                Ok(snapshot) => {
                    self.timestamps.lock().import_state(snapshot);
                    report.timestamps_restored = true;
                }
                Err(error) => warn!(%error, key = TIMESTAMP_STATE_KEY, "Ignoring corrupt persisted state"),
            }
        }

        if let Some(contents) = self.store.read(RETRY_QUEUE_KEY).await? {
            match serde_json::from_str::<RetryQueueSnapshot>(&contents) {
                Ok(snapshot) => {
                    report.operations_restored = self.retries.lock().import_state(snapshot, resolve);
                }
                Err(error) => warn!(%error, key = RETRY_QUEUE_KEY, "Ignoring corrupt persisted state"),
            }
        }

        let level = self.staleness().warning_level;
        *self.warning_level.lock() = level;

        info!(
            timestamps_restored = report.timestamps_restored,
            operations_restored = report.operations_restored,
            warning_level = ?level,
            "Restored reliability state"
        );
        Ok(report)
    }

    /// Write both snapshots to the store
    pub async fn persist(&self) -> HostResult<()> {
        let _ordered = self.persist_lock.lock().await;
        let (timestamps, retries) = self.export_json()?;

        self.store.write(TIMESTAMP_STATE_KEY, &timestamps).await?;
        self.store.write(RETRY_QUEUE_KEY, &retries).await?;
        debug!("Persisted reliability state");
        Ok(())
    }

    /// Record the outcome of a data refresh that finished now
    pub async fn record_refresh(&self, successful: bool) -> HostResult<WarningLevel> {
        self.timestamps.lock().update_timestamp(successful);
        let level = self.observe_warning_level();
        self.persist().await?;
        Ok(level)
    }

    /// Clear the refresh suspension without touching recorded update times
    pub async fn reset_suspension(&self) -> HostResult<()> {
        self.timestamps.lock().reset_suspension();
        self.persist().await
    }

    /// Queue an operation whose first attempt failed
    pub async fn register_failure(&self, request: RetryRequest) -> HostResult<()> {
        self.retries.lock().register(request);
        self.persist().await
    }

    /// Retry `id` now, ignoring its backoff
    ///
    /// Rejections surface as [`HostError::Rejected`](crate::HostError::Rejected)
    /// and leave the queue untouched.
    pub async fn force_retry(&self, id: &str) -> HostResult<ReportOutcome> {
        let dispatch = self.retries.lock().force_retry(id)?;
        let outcome = dispatch.run().await;
        let result = self.settle(&dispatch, outcome);
        self.observe_warning_level();
        self.persist().await?;
        Ok(result)
    }

    /// Stop tracking `id`; an executor already running is not interrupted
    pub async fn cancel(&self, id: &str) -> HostResult<bool> {
        let removed = self.retries.lock().cancel(id).is_some();
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Remove an exhausted operation
    pub async fn dismiss(&self, id: &str) -> HostResult<bool> {
        let removed = self.retries.lock().dismiss(id);
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Run every eligible operation once, concurrently, and record the outcomes
    ///
    /// While refreshes are suspended, eligible `data-fetch` and `scrape`
    /// operations stay queued until a refresh succeeds or the suspension is
    /// reset.
    pub async fn tick(&self) -> HostResult<TickReport> {
        let now = self.clock.now();
        let suspended = self.timestamps.lock().should_suspend();
        let (dispatches, held_back) = {
            let mut retries = self.retries.lock();
            if suspended {
                let held_back = retries
                    .list_eligible(now)
                    .iter()
                    .filter(|operation| operation.operation_type().refreshes_data())
                    .count();
                let dispatches = retries.dispatch_eligible_where(now, |operation| {
                    !operation.operation_type().refreshes_data()
                });
                (dispatches, held_back)
            } else {
                (retries.dispatch_eligible(now), 0)
            }
        };
        if held_back > 0 {
            debug!(held_back, "Refreshes suspended; holding back data refresh retries");
        }
        let outcomes = join_all(dispatches.iter().map(|dispatch| dispatch.run())).await;

        let mut report = TickReport {
            dispatched: dispatches.len(),
            held_back,
            completed: 0,
            rescheduled: 0,
            exhausted: 0,
            discarded: 0,
            warning_level: WarningLevel::None,
            suspended: false,
        };

        for (dispatch, outcome) in dispatches.iter().zip(outcomes) {
            report.count(self.settle(dispatch, outcome));
        }

        report.warning_level = self.observe_warning_level();
        report.suspended = self.timestamps.lock().should_suspend();

        if report.dispatched > 0 {
            debug!(
                dispatched = report.dispatched,
                completed = report.completed,
                rescheduled = report.rescheduled,
                exhausted = report.exhausted,
                "Tick finished"
            );
            self.persist().await?;
        }

        Ok(report)
    }

    /// Tick on an interval until `shutdown` fires, then persist once more
    pub async fn run(&self, shutdown: CancellationToken) -> HostResult<()> {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?self.tick_interval, "Monitor started");

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(error) = self.tick().await {
                        warn!(%error, "Monitor tick failed");
                    }
                }
            }
        }

        self.persist().await?;
        info!("Monitor stopped");
        Ok(())
    }

    /// Both snapshots as JSON, exported under one view of the managers
    fn export_json(&self) -> HostResult<(String, String)> {
        let timestamps = self.timestamps.lock();
        let retries = self.retries.lock();
        Ok((
            serde_json::to_string_pretty(&timestamps.export_state())?,
            serde_json::to_string_pretty(&retries.export_state())?,
        ))
    }

    /// Report a dispatch outcome; data refreshes also move the timestamp manager
    fn settle(&self, dispatch: &Dispatch, outcome: Result<(), ExecutorError>) -> ReportOutcome {
        let successful = outcome.is_ok();
        let result = self.retries.lock().report(dispatch, outcome);

        if dispatch.operation_type().refreshes_data() && result != ReportOutcome::Discarded {
            self.timestamps.lock().update_timestamp(successful);
        }
        result
    }

    /// Log freshness transitions and return the current level
    fn observe_warning_level(&self) -> WarningLevel {
        let info = self.staleness();
        let mut last = self.warning_level.lock();

        if *last != info.warning_level {
            match info.warning_level {
                WarningLevel::None => info!(detail = %info.message, "Data is fresh again"),
                WarningLevel::Warning | WarningLevel::Critical => warn!(
                    level = ?info.warning_level,
                    minutes_since_update = ?info.minutes_since_update,
                    detail = %info.message,
                    "Data freshness degraded"
                ),
            }
            *last = info.warning_level;
        }

        info.warning_level
    }
}
