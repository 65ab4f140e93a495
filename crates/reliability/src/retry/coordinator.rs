//! Queue of failed operations awaiting retry.
//!
//! The coordinator is pure state. It decides *when* an operation may run again
//! and hands out its executor inside a [`Dispatch`]; the caller awaits the
//! executor and reports the outcome back with [`RetryCoordinator::report`].
//!
//! Priority never influences ordering: eligible operations come back in
//! registration order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use super::backoff::{Backoff, JitterPolicy, schedule_after};
use super::executor::{Dispatch, ExecutorError, OperationExecutor};
use super::operation::{
    OperationRecord, OperationStatus, RetryOperation, RetryQueueSnapshot, RetryRequest,
};
use crate::clock::{Clock, SystemClock};
use crate::config::RetryConfig;
use crate::error::RetryRejected;
use crate::format;

/// What happened to a reported dispatch outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Success; the operation left the queue
    Completed,
    /// Failure; waiting for the next retry
    Rescheduled,
    /// Failure that reached `max_retries`
    Exhausted,
    /// The operation was cancelled or replaced after dispatch; result dropped
    Discarded,
}

/// Retry queue with backoff scheduling.
pub struct RetryCoordinator {
    operations: IndexMap<String, RetryOperation>,
    default_max_retries: u32,
    default_backoff: Backoff,
    jitter: JitterPolicy,
    next_generation: u64,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RetryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryCoordinator")
            .field("operations", &self.operations.len())
            .field("default_max_retries", &self.default_max_retries)
            .field("default_backoff", &self.default_backoff)
            .finish_non_exhaustive()
    }
}

impl Default for RetryCoordinator {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryCoordinator {
    /// Create a coordinator reading the system clock
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a coordinator reading `clock`
    #[must_use]
    pub fn with_clock(config: RetryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            operations: IndexMap::new(),
            default_max_retries: config.max_retries.max(1),
            default_backoff: config.backoff,
            jitter: config.jitter,
            next_generation: 0,
            clock,
        }
    }

    /// Queue an operation whose first attempt just failed.
    ///
    /// Registering an id that is already queued replaces the old entry; any
    /// outstanding dispatch of the old entry is discarded when reported.
    pub fn register(&mut self, request: RetryRequest) -> &RetryOperation {
        let now = self.clock.now();
        let backoff = request.backoff.unwrap_or_else(|| self.default_backoff.clone());
        let max_retries = request.max_retries.unwrap_or(self.default_max_retries).max(1);
        let next_retry_at = self.schedule(&backoff, 0, now);

        let record = OperationRecord {
            id: request.id,
            operation_type: request.operation_type,
            timestamp: request.first_attempt_at.unwrap_or(now),
            error: request.error,
            retry_count: 1,
            max_retries,
            next_retry_at,
            priority: request.priority,
            metadata: request.metadata,
            backoff,
        };

        if self.operations.contains_key(&record.id) {
            warn!(id = %record.id, "Replacing queued retry operation with the same id");
        }

        debug!(
            id = %record.id,
            operation_type = %record.operation_type,
            max_retries,
            next_retry_at = %next_retry_at,
            policy = record.backoff.policy_name(),
            "Registered retry operation"
        );

        let generation = self.bump_generation();
        let id = record.id.clone();
        let operation = RetryOperation {
            record,
            executor: request.executor,
            in_flight: false,
            generation,
        };

        // `insert` on an existing key keeps its position; re-registration
        // moves the entry to the back like a fresh registration.
        self.operations.shift_remove(&id);
        let (index, _) = self.operations.insert_full(id, operation);
        &self.operations[index]
    }

    /// Record another failed attempt.
    ///
    /// Unknown ids and exhausted operations are left alone. A dispatch still
    /// outstanding for `id` is superseded: its later report is discarded.
    pub fn record_failure(&mut self, id: &str, error: impl Into<String>) -> Option<&RetryOperation> {
        let generation = self.bump_generation();
        let operation = self.operations.get_mut(id)?;
        if operation.in_flight {
            debug!(id, "Superseding outstanding dispatch");
            operation.generation = generation;
        }
        self.apply_failure(id, error.into())
    }

    fn apply_failure(&mut self, id: &str, error: String) -> Option<&RetryOperation> {
        let now = self.clock.now();
        let jitter = self.jitter;
        let operation = self.operations.get_mut(id)?;
        operation.in_flight = false;

        if operation.is_exhausted() {
            debug!(id, "Ignoring failure for exhausted operation");
            return Some(&*operation);
        }

        let record = &mut operation.record;
        record.retry_count += 1;
        record.error = error;
        let delay = jitter.apply(record.backoff.delay(record.retry_count - 1));
        record.next_retry_at = schedule_after(now, delay);

        if record.retry_count >= record.max_retries {
            warn!(
                id,
                retry_count = record.retry_count,
                error = %record.error,
                "Retry operation reached max retries"
            );
        } else {
            debug!(
                id,
                retry_count = record.retry_count,
                delay = ?delay,
                "Rescheduled retry operation"
            );
        }

        Some(&*operation)
    }

    /// Remove an operation that finally succeeded
    pub fn record_success(&mut self, id: &str) -> Option<RetryOperation> {
        let removed = self.operations.shift_remove(id);
        if let Some(operation) = &removed {
            info!(
                id,
                attempts = operation.retry_count() + 1,
                "Retry operation succeeded"
            );
        }
        removed
    }

    /// Hand out the executor now, ignoring `next_retry_at`
    pub fn force_retry(&mut self, id: &str) -> Result<Dispatch, RetryRejected> {
        let operation = self
            .operations
            .get_mut(id)
            .ok_or_else(|| RetryRejected::UnknownOperation { id: id.to_string() })?;

        if operation.is_exhausted() {
            return Err(RetryRejected::Exhausted {
                id: id.to_string(),
                max_retries: operation.max_retries(),
            });
        }
        if operation.in_flight {
            return Err(RetryRejected::InFlight { id: id.to_string() });
        }

        debug!(id, "Forcing retry");
        Ok(Self::start(operation))
    }

    /// Dispatch every operation eligible at `now`, in registration order
    pub fn dispatch_eligible(&mut self, now: DateTime<Utc>) -> Vec<Dispatch> {
        self.dispatch_eligible_where(now, |_| true)
    }

    /// Dispatch the operations eligible at `now` that `keep` accepts.
    ///
    /// Rejected operations stay eligible for a later call.
    pub fn dispatch_eligible_where<P>(&mut self, now: DateTime<Utc>, mut keep: P) -> Vec<Dispatch>
    where
        P: FnMut(&RetryOperation) -> bool,
    {
        self.operations
            .values_mut()
            .filter(|operation| operation.status(now) == OperationStatus::Eligible && keep(&**operation))
            .map(Self::start)
            .collect()
    }

    /// Route an executor outcome back to its operation
    pub fn report(&mut self, dispatch: &Dispatch, outcome: Result<(), ExecutorError>) -> ReportOutcome {
        let current = self
            .operations
            .get(&dispatch.id)
            .is_some_and(|operation| operation.generation == dispatch.generation);

        if !current {
            debug!(id = %dispatch.id, "Discarding result for cancelled or replaced operation");
            return ReportOutcome::Discarded;
        }

        match outcome {
            Ok(()) => {
                self.record_success(&dispatch.id);
                ReportOutcome::Completed
            }
            Err(error) => match self.apply_failure(&dispatch.id, error.message().to_owned()) {
                Some(operation) if operation.is_exhausted() => ReportOutcome::Exhausted,
                Some(_) => ReportOutcome::Rescheduled,
                None => ReportOutcome::Discarded,
            },
        }
    }

    /// Drop an operation unconditionally; an executor already running is not interrupted
    pub fn cancel(&mut self, id: &str) -> Option<RetryOperation> {
        let removed = self.operations.shift_remove(id);
        if removed.is_some() {
            info!(id, "Cancelled retry operation");
        }
        removed
    }

    /// Remove an exhausted operation the user acknowledged
    pub fn dismiss(&mut self, id: &str) -> bool {
        if self.operations.get(id).is_some_and(RetryOperation::is_exhausted) {
            self.operations.shift_remove(id);
            debug!(id, "Dismissed exhausted retry operation");
            true
        } else {
            false
        }
    }

    /// Operations a scheduler may retry at `now`
    #[must_use]
    pub fn list_eligible(&self, now: DateTime<Utc>) -> Vec<&RetryOperation> {
        self.operations
            .values()
            .filter(|operation| operation.status(now) == OperationStatus::Eligible)
            .collect()
    }

    /// Operations that reached `max_retries`
    #[must_use]
    pub fn list_exhausted(&self) -> Vec<&RetryOperation> {
        self.operations
            .values()
            .filter(|operation| operation.is_exhausted())
            .collect()
    }

    /// Look up an operation
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&RetryOperation> {
        self.operations.get(id)
    }

    /// Every queued operation in registration order
    pub fn operations(&self) -> impl Iterator<Item = &RetryOperation> {
        self.operations.values()
    }

    /// Lifecycle status of `id` at `now`
    #[must_use]
    pub fn status(&self, id: &str, now: DateTime<Utc>) -> Option<OperationStatus> {
        self.operations.get(id).map(|operation| operation.status(now))
    }

    /// Countdown text of `id` at `now`
    #[must_use]
    pub fn countdown(&self, id: &str, now: DateTime<Utc>) -> Option<String> {
        self.operations
            .get(id)
            .map(|operation| format::retry_countdown(operation, now))
    }

    /// Number of queued operations, exhausted ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// True when nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Copy of the queue without executors
    #[must_use]
    pub fn export_state(&self) -> RetryQueueSnapshot {
        RetryQueueSnapshot {
            operations: self
                .operations
                .values()
                .map(|operation| operation.record.clone())
                .collect(),
        }
    }

    /// Replace the queue with `snapshot`, resolving an executor per record.
    ///
    /// Records whose executor cannot be resolved are skipped. Returns the
    /// number of operations restored.
    pub fn import_state<F>(&mut self, snapshot: RetryQueueSnapshot, mut resolve: F) -> usize
    where
        F: FnMut(&OperationRecord) -> Option<Arc<dyn OperationExecutor>>,
    {
        self.operations.clear();

        for mut record in snapshot.operations {
            let Some(executor) = resolve(&record) else {
                warn!(
                    id = %record.id,
                    operation_type = %record.operation_type,
                    "No executor for persisted retry operation; dropping it"
                );
                continue;
            };

            record.max_retries = record.max_retries.max(1);
            record.retry_count = record.retry_count.clamp(1, record.max_retries);

            let generation = self.bump_generation();
            let id = record.id.clone();
            self.operations.insert(
                id,
                RetryOperation {
                    record,
                    executor,
                    in_flight: false,
                    generation,
                },
            );
        }

        debug!(restored = self.operations.len(), "Imported retry queue");
        self.operations.len()
    }

    fn start(operation: &mut RetryOperation) -> Dispatch {
        operation.in_flight = true;
        Dispatch {
            id: operation.record.id.clone(),
            operation_type: operation.record.operation_type,
            attempt: operation.record.retry_count + 1,
            generation: operation.generation,
            executor: Arc::clone(&operation.executor),
        }
    }

    fn schedule(&self, backoff: &Backoff, attempt: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        schedule_after(now, self.jitter.apply(backoff.delay(attempt)))
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::retry::executor::executor_fn;
    use crate::retry::operation::{OperationType, Priority};
    use chrono::{TimeDelta, TimeZone};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
    }

    fn coordinator() -> (RetryCoordinator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let config = RetryConfig {
            backoff: Backoff::fixed(Duration::from_secs(30)),
            ..RetryConfig::default()
        };
        (RetryCoordinator::with_clock(config, clock.clone()), clock)
    }

    fn request(id: &str) -> RetryRequest {
        RetryRequest::new(
            id,
            OperationType::DataFetch,
            executor_fn(|| async { Ok(()) }),
            "connection reset",
        )
    }

    #[test]
    fn register_schedules_first_retry() {
        let (mut coordinator, _clock) = coordinator();
        let operation = coordinator.register(request("fetch-1").priority(Priority::High));

        assert_eq!(operation.retry_count(), 1);
        assert_eq!(operation.max_retries(), 5);
        assert_eq!(operation.timestamp(), start());
        assert_eq!(operation.next_retry_at(), start() + TimeDelta::seconds(30));
        assert_eq!(operation.priority(), Priority::High);
        assert_eq!(operation.status(start()), OperationStatus::Waiting);
    }

    #[test]
    fn failure_increments_and_reschedules() {
        let (mut coordinator, clock) = coordinator();
        coordinator.register(request("fetch-1"));
        clock.advance(TimeDelta::minutes(1));

        let operation = coordinator.record_failure("fetch-1", "timeout").unwrap();
        assert_eq!(operation.retry_count(), 2);
        assert_eq!(operation.error(), "timeout");
        assert_eq!(operation.next_retry_at(), start() + TimeDelta::seconds(90));
    }

    #[test]
    fn exhaustion_after_max_retries() {
        let (mut coordinator, _clock) = coordinator();
        coordinator.register(request("fetch-1").max_retries(5));

        for _ in 0..5 {
            coordinator.record_failure("fetch-1", "boom");
        }

        let operation = coordinator.get("fetch-1").unwrap();
        assert!(operation.is_exhausted());
        assert_eq!(operation.retry_count(), 5);
        assert_eq!(
            coordinator.force_retry("fetch-1").unwrap_err(),
            RetryRejected::Exhausted {
                id: "fetch-1".to_string(),
                max_retries: 5
            }
        );
        assert_eq!(
            coordinator.countdown("fetch-1", start()).as_deref(),
            Some("Max retries reached")
        );
        assert!(coordinator.list_eligible(start() + TimeDelta::days(1)).is_empty());
    }

    #[test]
    fn zero_max_retries_clamps_to_one() {
        let (mut coordinator, _clock) = coordinator();
        let operation = coordinator.register(request("fetch-1").max_retries(0));
        assert_eq!(operation.max_retries(), 1);
        assert!(operation.is_exhausted());
    }

    #[test]
    fn eligible_when_next_retry_passed() {
        let (mut coordinator, clock) = coordinator();
        coordinator.register(request("fetch-1"));
        clock.advance(TimeDelta::minutes(5));
        let now = clock.now();

        assert_eq!(coordinator.countdown("fetch-1", now).as_deref(), Some("Ready to retry"));
        let eligible: Vec<_> = coordinator
            .list_eligible(now)
            .into_iter()
            .map(RetryOperation::id)
            .collect();
        assert_eq!(eligible, vec!["fetch-1"]);
    }

    #[test]
    fn eligible_ignores_priority() {
        let (mut coordinator, clock) = coordinator();
        coordinator.register(request("low").priority(Priority::Low));
        coordinator.register(request("critical").priority(Priority::Critical));
        coordinator.register(request("medium"));
        clock.advance(TimeDelta::minutes(1));

        let ids: Vec<_> = coordinator
            .list_eligible(clock.now())
            .iter()
            .map(|op| op.id().to_string())
            .collect();
        assert_eq!(ids, vec!["low", "critical", "medium"]);
    }

    #[test]
    fn force_retry_marks_in_flight() {
        let (mut coordinator, _clock) = coordinator();
        coordinator.register(request("fetch-1"));

        let dispatch = coordinator.force_retry("fetch-1").unwrap();
        assert_eq!(dispatch.id(), "fetch-1");
        assert_eq!(dispatch.attempt(), 2);
        assert_eq!(coordinator.status("fetch-1", start()), Some(OperationStatus::Retrying));
        assert!(matches!(
            coordinator.force_retry("fetch-1"),
            Err(RetryRejected::InFlight { .. })
        ));
        assert!(coordinator.list_eligible(start() + TimeDelta::hours(1)).is_empty());
    }

    #[test]
    fn unknown_ids_are_no_ops() {
        let (mut coordinator, _clock) = coordinator();
        assert!(coordinator.cancel("missing").is_none());
        assert!(coordinator.record_failure("missing", "x").is_none());
        assert!(coordinator.record_success("missing").is_none());
        assert!(!coordinator.dismiss("missing"));
        assert!(matches!(
            coordinator.force_retry("missing"),
            Err(RetryRejected::UnknownOperation { .. })
        ));
    }

    #[test]
    fn report_routes_outcomes() {
        let (mut coordinator, _clock) = coordinator();
        coordinator.register(request("a"));
        coordinator.register(request("b").max_retries(2));

        let a = coordinator.force_retry("a").unwrap();
        let b = coordinator.force_retry("b").unwrap();

        assert_eq!(coordinator.report(&a, Ok(())), ReportOutcome::Completed);
        assert_eq!(
            coordinator.report(&b, Err(ExecutorError::new("still down"))),
            ReportOutcome::Exhausted
        );
        assert!(coordinator.get("a").is_none());
        assert_eq!(coordinator.get("b").unwrap().error(), "still down");
    }

    #[test]
    fn report_after_cancel_is_discarded() {
        let (mut coordinator, _clock) = coordinator();
        coordinator.register(request("a"));
        let dispatch = coordinator.force_retry("a").unwrap();
        coordinator.cancel("a");

        assert_eq!(coordinator.report(&dispatch, Ok(())), ReportOutcome::Discarded);
        assert!(coordinator.is_empty());
    }

    #[test]
    fn failure_recorded_during_dispatch_supersedes_it() {
        let (mut coordinator, _clock) = coordinator();
        coordinator.register(request("a"));
        let first = coordinator.force_retry("a").unwrap();

        coordinator.record_failure("a", "reported by caller");
        assert_eq!(coordinator.get("a").unwrap().retry_count(), 2);

        let second = coordinator.force_retry("a").unwrap();
        assert_eq!(second.attempt(), 3);
        assert!(matches!(
            coordinator.force_retry("a"),
            Err(RetryRejected::InFlight { .. })
        ));

        assert_eq!(
            coordinator.report(&first, Err(ExecutorError::new("late"))),
            ReportOutcome::Discarded
        );
        assert_eq!(coordinator.get("a").unwrap().retry_count(), 2);
        assert_eq!(coordinator.status("a", start()), Some(OperationStatus::Retrying));

        assert_eq!(
            coordinator.report(&second, Err(ExecutorError::new("down"))),
            ReportOutcome::Rescheduled
        );
        assert_eq!(coordinator.get("a").unwrap().retry_count(), 3);
    }

    #[test]
    fn report_after_reregistration_is_discarded() {
        let (mut coordinator, _clock) = coordinator();
        coordinator.register(request("a"));
        let stale = coordinator.force_retry("a").unwrap();
        coordinator.register(request("a"));

        assert_eq!(
            coordinator.report(&stale, Err(ExecutorError::new("late"))),
            ReportOutcome::Discarded
        );
        assert_eq!(coordinator.get("a").unwrap().retry_count(), 1);
    }

    #[test]
    fn dismiss_only_removes_exhausted() {
        let (mut coordinator, _clock) = coordinator();
        coordinator.register(request("a").max_retries(2));
        assert!(!coordinator.dismiss("a"));

        coordinator.record_failure("a", "down");
        assert_eq!(coordinator.list_exhausted().len(), 1);
        assert!(coordinator.dismiss("a"));
        assert!(coordinator.is_empty());
    }

    #[test]
    fn dispatch_eligible_skips_waiting() {
        let (mut coordinator, clock) = coordinator();
        coordinator.register(request("early"));
        clock.advance(TimeDelta::seconds(20));
        coordinator.register(request("late"));
        clock.advance(TimeDelta::seconds(15));

        let dispatches = coordinator.dispatch_eligible(clock.now());
        let ids: Vec<_> = dispatches.iter().map(Dispatch::id).collect();
        assert_eq!(ids, vec!["early"]);
        assert!(coordinator.dispatch_eligible(clock.now()).is_empty());
    }

    #[test]
    fn dispatch_where_leaves_rejected_eligible() {
        let (mut coordinator, clock) = coordinator();
        coordinator.register(request("fetch"));
        coordinator.register(RetryRequest::new(
            "process",
            OperationType::DataProcessing,
            executor_fn(|| async { Ok(()) }),
            "parse error",
        ));
        clock.advance(TimeDelta::minutes(1));
        let now = clock.now();

        let dispatches = coordinator
            .dispatch_eligible_where(now, |operation| !operation.operation_type().refreshes_data());
        let ids: Vec<_> = dispatches.iter().map(Dispatch::id).collect();
        assert_eq!(ids, vec!["process"]);
        assert_eq!(coordinator.status("fetch", now), Some(OperationStatus::Eligible));
    }

    #[test]
    fn snapshot_round_trip() {
        let (mut coordinator, _clock) = coordinator();
        coordinator.register(request("a").metadata("course", "CS101").metadata("page", 3_i64));
        coordinator.register(request("b").priority(Priority::Critical));
        coordinator.record_failure("b", "still failing");

        let snapshot = coordinator.export_state();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: RetryQueueSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, snapshot);

        let (mut fresh, _fresh_clock) = self::coordinator();
        let count = fresh.import_state(restored, |record| {
            (record.id != "b").then(|| executor_fn(|| async { Ok(()) }))
        });
        assert_eq!(count, 1);
        assert_eq!(fresh.get("a").unwrap().record(), coordinator.get("a").unwrap().record());
        assert!(fresh.get("b").is_none());
    }
}
