//! Timestamp formatting for log lines

use std::fmt;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;

/// Timer rendering `YYYY-MM-DD HH:MM:SS[.mmm]` in a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct LogTimer {
    offset: FixedOffset,
    milliseconds: bool,
}

/// Fixed offset `minutes` east of UTC; `None` outside +/- 24 hours
#[must_use]
pub fn utc_offset(minutes: i32) -> Option<FixedOffset> {
    minutes.checked_mul(60).and_then(FixedOffset::east_opt)
}

impl LogTimer {
    /// Timer in `utc_offset_minutes`; out-of-range offsets fall back to UTC
    #[must_use]
    pub fn new(utc_offset_minutes: i32, milliseconds: bool) -> Self {
        let offset = utc_offset(utc_offset_minutes).unwrap_or_else(|| Utc.fix());
        Self {
            offset,
            milliseconds,
        }
    }

    /// Same offset, with or without milliseconds
    #[must_use]
    pub const fn with_milliseconds(mut self, milliseconds: bool) -> Self {
        self.milliseconds = milliseconds;
        self
    }

    /// Render `now` the way log lines show it
    #[must_use]
    pub fn render(&self, now: DateTime<Utc>) -> String {
        let local = now.with_timezone(&self.offset);
        if self.milliseconds {
            local.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
        } else {
            local.format("%Y-%m-%d %H:%M:%S").to_string()
        }
    }
}

impl FormatTime for LogTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        w.write_str(&self.render(Utc::now()))
    }
}
