//! Freshness classification.

use serde::{Deserialize, Serialize};

/// Critical staleness starts at this multiple of the threshold.
pub const CRITICAL_MULTIPLIER: i64 = 3;

/// Tri-state freshness classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    /// Within the threshold
    None,
    /// Past the threshold
    Warning,
    /// Past three times the threshold, or never updated
    Critical,
}

impl WarningLevel {
    /// Classify elapsed minutes against a threshold; `None` means never updated
    #[must_use]
    pub fn classify(minutes_since_update: Option<i64>, threshold_minutes: u32) -> Self {
        let threshold = i64::from(threshold_minutes.max(1));
        match minutes_since_update {
            None => Self::Critical,
            Some(minutes) if minutes >= threshold * CRITICAL_MULTIPLIER => Self::Critical,
            Some(minutes) if minutes >= threshold => Self::Warning,
            Some(_) => Self::None,
        }
    }

    /// True for any level other than `None`
    #[must_use]
    pub fn is_stale(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Snapshot of how fresh the data is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StalenessInfo {
    /// Elapsed minutes reached the threshold, or no update was ever recorded
    pub is_stale: bool,
    /// Whole minutes since the last successful update
    pub minutes_since_update: Option<i64>,
    /// Classification
    pub warning_level: WarningLevel,
    /// Human phrase matching the level
    pub message: String,
}

impl StalenessInfo {
    /// Build the info for an elapsed duration
    #[must_use]
    pub fn new(minutes_since_update: Option<i64>, threshold_minutes: u32) -> Self {
        let warning_level = WarningLevel::classify(minutes_since_update, threshold_minutes);
        let message = match (warning_level, minutes_since_update) {
            (_, None) => {
                "No successful update recorded; data is severely outdated".to_string()
            }
            (WarningLevel::None, Some(_)) => "Data is up to date".to_string(),
            (WarningLevel::Warning, Some(minutes)) => {
                format!("Data is stale: last updated {}", minutes_phrase(minutes))
            }
            (WarningLevel::Critical, Some(minutes)) => {
                format!("Data is severely outdated: last updated {}", minutes_phrase(minutes))
            }
        };

        Self {
            is_stale: warning_level.is_stale(),
            minutes_since_update,
            warning_level,
            message,
        }
    }
}

fn minutes_phrase(minutes: i64) -> String {
    if minutes == 1 {
        "1 minute ago".to_string()
    } else {
        format!("{minutes} minutes ago")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some(0), WarningLevel::None)]
    #[case(Some(14), WarningLevel::None)]
    #[case(Some(15), WarningLevel::Warning)]
    #[case(Some(44), WarningLevel::Warning)]
    #[case(Some(45), WarningLevel::Critical)]
    #[case(None, WarningLevel::Critical)]
    fn classify_against_fifteen_minutes(#[case] minutes: Option<i64>, #[case] expected: WarningLevel) {
        assert_eq!(WarningLevel::classify(minutes, 15), expected);
    }

    #[test]
    fn messages_follow_level() {
        assert_eq!(StalenessInfo::new(Some(3), 15).message, "Data is up to date");
        assert!(StalenessInfo::new(Some(20), 15).message.contains("stale"));
        assert!(StalenessInfo::new(Some(60), 15).message.contains("severely outdated"));
        assert!(StalenessInfo::new(None, 15).message.contains("severely outdated"));
    }

    #[test]
    fn zero_threshold_behaves_as_one() {
        assert_eq!(WarningLevel::classify(Some(0), 0), WarningLevel::None);
        assert_eq!(WarningLevel::classify(Some(1), 0), WarningLevel::Warning);
        assert_eq!(WarningLevel::classify(Some(3), 0), WarningLevel::Critical);
    }
}
