//! Tracking of when data was last refreshed successfully.
//!
//! A failed refresh never moves the update time; it only counts towards
//! `failed_operation_count`. Everything a dashboard shows about freshness is
//! derived from the last *successful* refresh.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tidemark_log::LogTimer;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::TimestampConfig;
use crate::format::{self, DisplayOptions, NEVER_UPDATED, STALE_SUFFIX};
use crate::staleness::StalenessInfo;

/// Persisted form of a [`TimestampManager`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampSnapshot {
    /// Last reported success
    pub actual_update_time: Option<DateTime<Utc>>,
    /// Instant shown to users; mirrors `actual_update_time`
    pub display_update_time: Option<DateTime<Utc>>,
    /// Failures since the last success
    pub failed_operation_count: u32,
    /// Staleness threshold in minutes
    pub staleness_threshold_minutes: u32,
}

/// Elapsed time since the last successful update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeDifference {
    /// Whole hours
    pub hours: i64,
    /// Whole minutes (total, not the remainder)
    pub total_minutes: i64,
    /// Whole seconds (total)
    pub total_seconds: i64,
    /// `"{h}h {m}m {s}s"`, or an explanation when nothing was recorded
    pub formatted: String,
}

/// Single source of truth for data freshness.
pub struct TimestampManager {
    actual_update_time: Option<DateTime<Utc>>,
    display_update_time: Option<DateTime<Utc>>,
    last_successful_operation: Option<DateTime<Utc>>,
    failed_operation_count: u32,
    staleness_threshold_minutes: u32,
    max_consecutive_failures: u32,
    log_timer: LogTimer,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TimestampManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimestampManager")
            .field("actual_update_time", &self.actual_update_time)
            .field("failed_operation_count", &self.failed_operation_count)
            .field("staleness_threshold_minutes", &self.staleness_threshold_minutes)
            .finish_non_exhaustive()
    }
}

impl Default for TimestampManager {
    fn default() -> Self {
        Self::new(TimestampConfig::default())
    }
}

impl TimestampManager {
    /// Create a manager reading the system clock
    #[must_use]
    pub fn new(config: TimestampConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a manager reading `clock`
    #[must_use]
    pub fn with_clock(config: TimestampConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            actual_update_time: None,
            display_update_time: None,
            last_successful_operation: None,
            failed_operation_count: 0,
            staleness_threshold_minutes: config.staleness_threshold_minutes.max(1),
            max_consecutive_failures: config.max_consecutive_failures.max(1),
            log_timer: LogTimer::new(config.log_utc_offset_minutes, false),
            clock,
        }
    }

    /// Record the outcome of a refresh that finished now
    pub fn update_timestamp(&mut self, successful: bool) {
        let now = self.clock.now();
        self.update_timestamp_at(successful, now);
    }

    /// Record the outcome of a refresh that finished at `operation_time`
    pub fn update_timestamp_at(&mut self, successful: bool, operation_time: DateTime<Utc>) {
        if successful {
            let was_suspended = self.should_suspend();
            self.actual_update_time = Some(operation_time);
            self.display_update_time = Some(operation_time);
            self.last_successful_operation = Some(operation_time);
            self.failed_operation_count = 0;

            if was_suspended {
                info!(at = %operation_time, "Refresh succeeded; suspension cleared");
            } else {
                debug!(at = %operation_time, "Recorded successful refresh");
            }
        } else {
            self.failed_operation_count = self.failed_operation_count.saturating_add(1);
            debug!(
                failed_operation_count = self.failed_operation_count,
                "Recorded failed refresh"
            );

            if self.failed_operation_count == self.max_consecutive_failures {
                warn!(
                    failed_operation_count = self.failed_operation_count,
                    "Consecutive refresh failures reached the suspension limit"
                );
            }
        }
    }

    /// Last reported success
    #[must_use]
    pub fn actual_update_time(&self) -> Option<DateTime<Utc>> {
        self.actual_update_time
    }

    /// Instant shown to users
    #[must_use]
    pub fn display_update_time(&self) -> Option<DateTime<Utc>> {
        self.display_update_time
    }

    /// Instant of the last successful operation
    #[must_use]
    pub fn last_successful_operation(&self) -> Option<DateTime<Utc>> {
        self.last_successful_operation
    }

    /// Failures since the last success
    #[must_use]
    pub fn failed_operation_count(&self) -> u32 {
        self.failed_operation_count
    }

    /// True once consecutive failures reached the configured limit
    #[must_use]
    pub fn should_suspend(&self) -> bool {
        self.failed_operation_count >= self.max_consecutive_failures
    }

    /// Relative freshness text
    #[must_use]
    pub fn display_time(&self, options: DisplayOptions) -> String {
        self.display_time_at(options, self.clock.now())
    }

    /// Relative freshness text at `now`
    #[must_use]
    pub fn display_time_at(&self, options: DisplayOptions, now: DateTime<Utc>) -> String {
        let Some(display) = self.display_update_time else {
            return NEVER_UPDATED.to_string();
        };

        let mut text = format::relative_time(now - display, options);
        if options.include_stale_warning && self.is_stale_at(now) {
            text.push_str(STALE_SUFFIX);
        }
        text
    }

    /// Whether the data is stale now
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(self.clock.now())
    }

    /// Whether the data is stale at `now`
    #[must_use]
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        match self.minutes_since_update(now) {
            None => true,
            Some(minutes) => minutes >= i64::from(self.staleness_threshold_minutes),
        }
    }

    /// Staleness classification now
    #[must_use]
    pub fn staleness_info(&self) -> StalenessInfo {
        self.staleness_info_at(self.clock.now())
    }

    /// Staleness classification at `now`
    #[must_use]
    pub fn staleness_info_at(&self, now: DateTime<Utc>) -> StalenessInfo {
        StalenessInfo::new(self.minutes_since_update(now), self.staleness_threshold_minutes)
    }

    /// Elapsed time since the last success, relative to now
    #[must_use]
    pub fn time_difference(&self) -> TimeDifference {
        self.time_difference_at(self.clock.now())
    }

    /// Elapsed time since the last success, relative to `reference`
    #[must_use]
    pub fn time_difference_at(&self, reference: DateTime<Utc>) -> TimeDifference {
        let Some(actual) = self.actual_update_time else {
            return TimeDifference {
                hours: 0,
                total_minutes: 0,
                total_seconds: 0,
                formatted: "No successful update recorded".to_string(),
            };
        };

        let total_seconds = (reference - actual).num_seconds().max(0);
        TimeDifference {
            hours: total_seconds / 3600,
            total_minutes: total_seconds / 60,
            total_seconds,
            formatted: format::hms(total_seconds),
        }
    }

    /// Copy of the persistable state
    #[must_use]
    pub fn export_state(&self) -> TimestampSnapshot {
        TimestampSnapshot {
            actual_update_time: self.actual_update_time,
            display_update_time: self.display_update_time,
            failed_operation_count: self.failed_operation_count,
            staleness_threshold_minutes: self.staleness_threshold_minutes,
        }
    }

    /// Replace all state with `snapshot`
    pub fn import_state(&mut self, snapshot: TimestampSnapshot) {
        self.actual_update_time = snapshot.actual_update_time;
        self.display_update_time = snapshot.display_update_time;
        self.last_successful_operation = snapshot.actual_update_time;
        self.failed_operation_count = snapshot.failed_operation_count;
        self.staleness_threshold_minutes = snapshot.staleness_threshold_minutes.max(1);
        debug!(
            actual_update_time = ?self.actual_update_time,
            failed_operation_count = self.failed_operation_count,
            "Imported timestamp state"
        );
    }

    /// Forget every recorded update and failure
    pub fn reset(&mut self) {
        self.actual_update_time = None;
        self.display_update_time = None;
        self.last_successful_operation = None;
        self.failed_operation_count = 0;
    }

    /// Clear the consecutive failure count, keeping every recorded update
    pub fn reset_suspension(&mut self) {
        if self.should_suspend() {
            info!(
                failed_operation_count = self.failed_operation_count,
                "Refresh suspension reset"
            );
        }
        self.failed_operation_count = 0;
    }

    /// Set the staleness threshold, clamped to at least one minute
    pub fn set_staleness_threshold(&mut self, minutes: u32) {
        self.staleness_threshold_minutes = minutes.max(1);
    }

    /// Staleness threshold in minutes
    #[must_use]
    pub fn staleness_threshold(&self) -> u32 {
        self.staleness_threshold_minutes
    }

    /// Now as `YYYY-MM-DD HH:MM:SS[.mmm]` in the configured log offset
    #[must_use]
    pub fn log_timestamp(&self, with_milliseconds: bool) -> String {
        self.log_timer
            .with_milliseconds(with_milliseconds)
            .render(self.clock.now())
    }

    fn minutes_since_update(&self, now: DateTime<Utc>) -> Option<i64> {
        self.actual_update_time
            .map(|actual| (now - actual).num_minutes().max(0))
    }
}
