//! Monitor behaviour over an in-memory store and a manual clock

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use pretty_assertions::assert_eq;
use async_trait::async_trait;
use tidemark_host::{
    HostConfig, HostError, HostResult, JsonFileStore, MemoryStore, Monitor, RETRY_QUEUE_KEY,
    StateStore, TIMESTAMP_STATE_KEY,
};
use tidemark_reliability::retry::OperationExecutor;
use tidemark_reliability::{
    Backoff, Clock, ExecutorError, ManualClock, OperationType, ReportOutcome, RetryRejected,
    RetryRequest, WarningLevel, executor_fn,
};
use tokio_util::sync::CancellationToken;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
}

fn config() -> HostConfig {
    let mut config = HostConfig {
        tick_interval_ms: 100,
        ..HostConfig::default()
    };
    config.reliability.retry.backoff = Backoff::fixed(Duration::from_secs(10));
    config
}

struct Harness {
    monitor: Monitor,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
}

fn harness() -> Harness {
    let _ = tidemark_log::init_test();
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(start()));
    let monitor = Monitor::with_clock(&config(), store.clone(), clock.clone());
    Harness {
        monitor,
        store,
        clock,
    }
}

fn counting(fail: bool) -> (Arc<dyn OperationExecutor>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let executor = executor_fn(move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            if fail {
                Err(ExecutorError::new("backend unavailable"))
            } else {
                Ok(())
            }
        }
    });
    (executor, calls)
}

/// Memory store whose first write stalls, letting later writes overtake it
#[derive(Default)]
struct SlowFirstWrite {
    inner: MemoryStore,
    stalled: AtomicBool,
}

#[async_trait]
impl StateStore for SlowFirstWrite {
    async fn read(&self, key: &str) -> HostResult<Option<String>> {
        self.inner.read(key).await
    }

    async fn write(&self, key: &str, contents: &str) -> HostResult<()> {
        if !self.stalled.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.inner.write(key, contents).await
    }
}

#[tokio::test]
async fn restores_state_after_reload() {
    let Harness {
        monitor,
        store,
        clock,
    } = harness();

    monitor.record_refresh(true).await.unwrap();
    monitor.record_refresh(false).await.unwrap();
    monitor
        .register_failure(
            RetryRequest::new("fetch-courses", OperationType::DataFetch, counting(false).0, "timeout")
                .metadata("page", 2_i64),
        )
        .await
        .unwrap();

    assert!(store.get(TIMESTAMP_STATE_KEY).is_some());
    assert!(store.get(RETRY_QUEUE_KEY).is_some());

    let reloaded = Monitor::with_clock(&config(), store.clone(), clock.clone());
    let report = reloaded.restore(|_| Some(counting(false).0)).await.unwrap();

    assert!(report.timestamps_restored);
    assert_eq!(report.operations_restored, 1);
    assert_eq!(
        reloaded.with_timestamps(|t| t.export_state()),
        monitor.with_timestamps(|t| t.export_state())
    );
    assert_eq!(
        reloaded.with_retries(|r| r.export_state()),
        monitor.with_retries(|r| r.export_state())
    );
    assert_eq!(reloaded.countdown("fetch-courses").as_deref(), Some("Retry in 10s"));
}

#[tokio::test]
async fn overlapping_mutations_persist_latest_state() {
    let _ = tidemark_log::init_test();
    let store = Arc::new(SlowFirstWrite::default());
    let clock = Arc::new(ManualClock::new(start()));
    let monitor = Monitor::with_clock(&config(), store.clone(), clock.clone());

    let (refreshed, registered) = tokio::join!(
        monitor.record_refresh(true),
        monitor.register_failure(RetryRequest::new(
            "fetch",
            OperationType::DataFetch,
            counting(false).0,
            "timeout",
        )),
    );
    refreshed.unwrap();
    registered.unwrap();
    assert_eq!(monitor.with_retries(|r| r.len()), 1);

    let reloaded = Monitor::with_clock(&config(), store.clone(), clock.clone());
    let report = reloaded.restore(|_| Some(counting(false).0)).await.unwrap();

    assert!(report.timestamps_restored);
    assert_eq!(report.operations_restored, 1);
    assert_eq!(reloaded.with_timestamps(|t| t.actual_update_time()), Some(start()));
}

#[tokio::test]
async fn corrupt_state_is_ignored() {
    let Harness { monitor, store, .. } = harness();
    store.insert(TIMESTAMP_STATE_KEY, "{ not json");
    store.insert(RETRY_QUEUE_KEY, r#"{ "operations": 42 }"#);

    let report = monitor.restore(|_| None).await.unwrap();

    assert!(!report.timestamps_restored);
    assert_eq!(report.operations_restored, 0);
    assert_eq!(monitor.with_timestamps(|t| t.actual_update_time()), None);
    assert_eq!(monitor.staleness().warning_level, WarningLevel::Critical);
}

#[tokio::test]
async fn tick_runs_eligible_operations_and_refreshes_timestamp() {
    let Harness { monitor, clock, .. } = harness();
    let (fetch, fetch_calls) = counting(false);
    let (expand, expand_calls) = counting(true);

    monitor
        .register_failure(RetryRequest::new("fetch", OperationType::DataFetch, fetch, "timeout"))
        .await
        .unwrap();
    monitor
        .register_failure(RetryRequest::new(
            "expand",
            OperationType::CourseExpansion,
            expand,
            "parse error",
        ))
        .await
        .unwrap();

    let idle = monitor.tick().await.unwrap();
    assert_eq!(idle.dispatched, 0);

    clock.advance(TimeDelta::seconds(11));
    let report = monitor.tick().await.unwrap();

    assert_eq!(report.dispatched, 2);
    assert_eq!(report.completed, 1);
    assert_eq!(report.rescheduled, 1);
    assert_eq!(report.warning_level, WarningLevel::None);
    assert_eq!(fetch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(expand_calls.load(Ordering::SeqCst), 1);

    // Only the data fetch moved the freshness timestamp
    assert_eq!(monitor.with_timestamps(|t| t.actual_update_time()), Some(clock.now()));
    assert_eq!(monitor.with_timestamps(|t| t.failed_operation_count()), 0);
    assert_eq!(monitor.with_retries(|r| r.len()), 1);
}

#[tokio::test]
async fn failed_scrape_counts_as_failed_refresh() {
    let Harness { monitor, clock, .. } = harness();
    let (scrape, _) = counting(true);
    monitor
        .register_failure(
            RetryRequest::new("scrape", OperationType::Scrape, scrape, "blocked").max_retries(2),
        )
        .await
        .unwrap();

    clock.advance(TimeDelta::seconds(11));
    let report = monitor.tick().await.unwrap();

    assert_eq!(report.exhausted, 1);
    assert_eq!(monitor.with_timestamps(|t| t.failed_operation_count()), 1);
    assert_eq!(monitor.countdown("scrape").as_deref(), Some("Max retries reached"));

    assert!(matches!(
        monitor.force_retry("scrape").await,
        Err(HostError::Rejected(RetryRejected::Exhausted { .. }))
    ));
    assert!(monitor.dismiss("scrape").await.unwrap());
    assert!(monitor.with_retries(|r| r.is_empty()));
}

#[tokio::test]
async fn suspension_holds_back_data_refreshes_until_reset() {
    let _ = tidemark_log::init_test();
    let mut config = config();
    config.reliability.timestamp.max_consecutive_failures = 2;
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(start()));
    let monitor = Monitor::with_clock(&config, store, clock.clone());

    monitor.record_refresh(true).await.unwrap();
    monitor.record_refresh(false).await.unwrap();
    monitor.record_refresh(false).await.unwrap();
    assert!(monitor.with_timestamps(|t| t.should_suspend()));

    let (fetch, fetch_calls) = counting(false);
    let (expand, expand_calls) = counting(false);
    monitor
        .register_failure(RetryRequest::new("fetch", OperationType::DataFetch, fetch, "timeout"))
        .await
        .unwrap();
    monitor
        .register_failure(RetryRequest::new(
            "expand",
            OperationType::CourseExpansion,
            expand,
            "parse error",
        ))
        .await
        .unwrap();
    clock.advance(TimeDelta::seconds(11));

    let suspended = monitor.tick().await.unwrap();
    assert_eq!(suspended.dispatched, 1);
    assert_eq!(suspended.held_back, 1);
    assert_eq!(suspended.completed, 1);
    assert!(suspended.suspended);
    assert_eq!(fetch_calls.load(Ordering::SeqCst), 0);
    assert_eq!(expand_calls.load(Ordering::SeqCst), 1);

    monitor.reset_suspension().await.unwrap();
    assert_eq!(monitor.with_timestamps(|t| t.failed_operation_count()), 0);
    assert_eq!(monitor.with_timestamps(|t| t.actual_update_time()), Some(start()));

    let resumed = monitor.tick().await.unwrap();
    assert_eq!(resumed.dispatched, 1);
    assert_eq!(resumed.held_back, 0);
    assert_eq!(resumed.completed, 1);
    assert!(!resumed.suspended);
    assert_eq!(fetch_calls.load(Ordering::SeqCst), 1);
    assert!(monitor.with_retries(|r| r.is_empty()));
}

#[tokio::test]
async fn force_retry_and_cancel() {
    let Harness { monitor, .. } = harness();
    let (fetch, calls) = counting(false);
    monitor
        .register_failure(RetryRequest::new("fetch", OperationType::DataFetch, fetch, "timeout"))
        .await
        .unwrap();

    assert_eq!(monitor.force_retry("fetch").await.unwrap(), ReportOutcome::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!monitor.staleness().is_stale);

    assert!(!monitor.cancel("fetch").await.unwrap());
    assert!(matches!(
        monitor.force_retry("fetch").await,
        Err(HostError::Rejected(RetryRejected::UnknownOperation { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn run_loop_ticks_until_cancelled() {
    let Harness {
        monitor,
        store,
        clock,
    } = harness();
    let monitor = Arc::new(monitor);
    let (fetch, calls) = counting(false);
    monitor
        .register_failure(RetryRequest::new("fetch", OperationType::DataFetch, fetch, "timeout"))
        .await
        .unwrap();
    clock.advance(TimeDelta::minutes(1));

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn({
        let monitor = Arc::clone(&monitor);
        let shutdown = shutdown.clone();
        async move { monitor.run(shutdown).await }
    });

    tokio::time::sleep(Duration::from_millis(350)).await;
    shutdown.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(monitor.with_retries(|r| r.is_empty()));
    assert!(store.get(RETRY_QUEUE_KEY).unwrap().contains("\"operations\": []"));
}

#[tokio::test]
async fn file_store_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(start()));
    let mut config = config();
    config.state_dir = dir.path().to_path_buf();

    let first = Monitor::with_clock(&config, Arc::new(JsonFileStore::new(&config.state_dir)), clock.clone());
    first.record_refresh(true).await.unwrap();

    let second = Monitor::with_clock(&config, Arc::new(JsonFileStore::new(&config.state_dir)), clock.clone());
    let report = second.restore(|_| None).await.unwrap();

    assert!(report.timestamps_restored);
    assert_eq!(second.with_timestamps(|t| t.last_successful_operation()), Some(start()));
    assert!(dir.path().join("timestamp-state.json").exists());
}
