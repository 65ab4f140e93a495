//! Property tests for timestamp tracking

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use proptest::prelude::*;
use tidemark_reliability::{ManualClock, TimestampConfig, TimestampManager};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
}

fn manager(threshold: u32) -> TimestampManager {
    let config = TimestampConfig {
        staleness_threshold_minutes: threshold,
        ..TimestampConfig::default()
    };
    TimestampManager::with_clock(config, Arc::new(ManualClock::new(start())))
}

proptest! {
    #[test]
    fn display_time_tracks_last_success(outcomes in prop::collection::vec(any::<bool>(), 0..40)) {
        let mut manager = manager(15);
        let mut last_success = None;
        let mut failures_since = 0_u32;

        for (i, successful) in outcomes.iter().copied().enumerate() {
            let at = start() + TimeDelta::minutes(i64::try_from(i).unwrap());
            manager.update_timestamp_at(successful, at);
            if successful {
                last_success = Some(at);
                failures_since = 0;
            } else {
                failures_since += 1;
            }
        }

        prop_assert_eq!(manager.display_update_time(), last_success);
        prop_assert_eq!(manager.actual_update_time(), last_success);
        prop_assert_eq!(manager.last_successful_operation(), last_success);
        prop_assert_eq!(manager.failed_operation_count(), failures_since);
    }

    #[test]
    fn stale_iff_elapsed_reaches_threshold(threshold in 1_u32..120, elapsed in 0_i64..600) {
        let mut manager = manager(threshold);
        manager.update_timestamp_at(true, start());

        let now = start() + TimeDelta::minutes(elapsed);
        prop_assert_eq!(manager.is_stale_at(now), elapsed >= i64::from(threshold));
        prop_assert_eq!(manager.staleness_info_at(now).is_stale, manager.is_stale_at(now));
    }

    #[test]
    fn snapshot_round_trips(
        offset_secs in 0_i64..1000,
        failures in 0_u32..20,
        threshold in 1_u32..240,
    ) {
        let mut original = manager(threshold);
        original.update_timestamp_at(true, start() + TimeDelta::seconds(offset_secs));
        for _ in 0..failures {
            original.update_timestamp(false);
        }

        let json = serde_json::to_string(&original.export_state()).unwrap();
        let mut restored = manager(15);
        restored.import_state(serde_json::from_str(&json).unwrap());

        prop_assert_eq!(restored.export_state(), original.export_state());
        prop_assert_eq!(
            restored.last_successful_operation(),
            original.last_successful_operation()
        );
    }

    #[test]
    fn threshold_never_below_one(minutes in any::<u32>()) {
        let mut manager = manager(15);
        manager.set_staleness_threshold(minutes);
        prop_assert_eq!(manager.staleness_threshold(), minutes.max(1));
    }
}
