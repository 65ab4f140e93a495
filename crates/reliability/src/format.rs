//! Presentation formatting shared by the managers.
//!
//! Pure functions over state the core returns; any rendering layer may call
//! them at any cadence.

use chrono::{DateTime, TimeDelta, Utc};

use crate::retry::RetryOperation;

/// Text shown when no successful update was ever recorded
pub const NEVER_UPDATED: &str = "Never updated";

/// Suffix appended by `include_stale_warning`
pub const STALE_SUFFIX: &str = " (STALE)";

/// Options for relative freshness text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayOptions {
    /// Report seconds below one minute
    pub show_seconds: bool,
    /// Compact tokens such as `2M` or `3D`
    pub use_short_format: bool,
    /// Append a staleness suffix when the data is stale
    pub include_stale_warning: bool,
}

impl DisplayOptions {
    /// Report seconds below one minute
    #[must_use]
    pub const fn with_seconds(mut self) -> Self {
        self.show_seconds = true;
        self
    }

    /// Use compact tokens
    #[must_use]
    pub const fn short(mut self) -> Self {
        self.use_short_format = true;
        self
    }

    /// Append the staleness suffix when stale
    #[must_use]
    pub const fn with_stale_warning(mut self) -> Self {
        self.include_stale_warning = true;
        self
    }
}

/// Relative text for an elapsed duration (negative elapsed counts as zero).
#[must_use]
pub fn relative_time(elapsed: TimeDelta, options: DisplayOptions) -> String {
    let seconds = elapsed.num_seconds().max(0);
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if minutes < 1 {
        return match (options.show_seconds && seconds >= 1, options.use_short_format) {
            (true, true) => format!("{seconds}S"),
            (true, false) => format!("{} AGO", unit(seconds, "SECOND")),
            (false, true) => "<1M".to_string(),
            (false, false) => "LESS_THAN A MINUTE".to_string(),
        };
    }

    let (value, long_unit, short_unit) = if minutes < 60 {
        (minutes, "MINUTE", "M")
    } else if hours < 24 {
        (hours, "HOUR", "H")
    } else {
        (days, "DAY", "D")
    };

    if options.use_short_format {
        format!("{value}{short_unit}")
    } else {
        format!("{} AGO", unit(value, long_unit))
    }
}

fn unit(value: i64, name: &str) -> String {
    if value == 1 {
        format!("{value} {name}")
    } else {
        format!("{value} {name}S")
    }
}

/// `"{h}h {m}m {s}s"` for a non-negative number of seconds
#[must_use]
pub fn hms(total_seconds: i64) -> String {
    let total_seconds = total_seconds.max(0);
    format!(
        "{}h {}m {}s",
        total_seconds / 3600,
        (total_seconds / 60) % 60,
        total_seconds % 60
    )
}

/// Countdown text for a queued operation at `now`.
#[must_use]
pub fn retry_countdown(operation: &RetryOperation, now: DateTime<Utc>) -> String {
    if operation.is_exhausted() {
        return "Max retries reached".to_string();
    }
    countdown_until(operation.next_retry_at(), now)
}

/// Countdown text until `next_retry_at`.
#[must_use]
pub fn countdown_until(next_retry_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let remaining_ms = (next_retry_at - now).num_milliseconds();
    if remaining_ms <= 0 {
        return "Ready to retry".to_string();
    }

    // Round up so a 500ms wait never reads as 0s.
    let seconds = (remaining_ms + 999) / 1000;
    if seconds >= 60 {
        format!("Retry in {}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("Retry in {seconds}s")
    }
}
