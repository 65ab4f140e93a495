//! Backoff policies used to schedule the next retry of a queued operation.
//!
//! Policies are plain data so they persist alongside the operation they
//! belong to. Delays are in milliseconds to keep the JSON form readable.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Upper bound accepted for any single delay (one day).
const MAX_DELAY_CEILING_MS: u64 = 86_400_000;

/// Delay schedule between retry attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every retry
    Fixed {
        /// Delay in milliseconds
        delay_ms: u64,
    },
    /// delay = base * (attempt + 1), capped
    Linear {
        /// Base delay in milliseconds
        base_ms: u64,
        /// Cap in milliseconds
        max_ms: u64,
    },
    /// delay = base * multiplier^attempt, capped
    Exponential {
        /// Base delay in milliseconds
        base_ms: u64,
        /// Growth factor, at least 1.0
        multiplier: f64,
        /// Cap in milliseconds
        max_ms: u64,
    },
    /// Explicit per-attempt delays, then a default
    Custom {
        /// Delays for the first attempts
        delays_ms: Vec<u64>,
        /// Delay once `delays_ms` is exhausted
        default_ms: u64,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base_ms: 30_000,
            multiplier: 2.0,
            max_ms: 600_000,
        }
    }
}

impl Backoff {
    /// Fixed delay
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self::Fixed {
            delay_ms: duration_ms(delay),
        }
    }

    /// Linear backoff
    #[must_use]
    pub fn linear(base: Duration, max: Duration) -> Self {
        Self::Linear {
            base_ms: duration_ms(base),
            max_ms: duration_ms(max),
        }
    }

    /// Exponential backoff
    #[must_use]
    pub fn exponential(base: Duration, multiplier: f64, max: Duration) -> Self {
        Self::Exponential {
            base_ms: duration_ms(base),
            multiplier,
            max_ms: duration_ms(max),
        }
    }

    /// Custom schedule from millisecond values
    #[must_use]
    pub fn custom(delays_ms: &[u64], default_ms: u64) -> Self {
        Self::Custom {
            delays_ms: delays_ms.to_vec(),
            default_ms,
        }
    }

    /// Delay before the retry following failed attempt `attempt` (0-indexed)
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let millis = match self {
            Self::Fixed { delay_ms } => *delay_ms,
            Self::Linear { base_ms, max_ms } => base_ms
                .saturating_mul(u64::from(attempt) + 1)
                .min(*max_ms),
            Self::Exponential {
                base_ms,
                multiplier,
                max_ms,
            } => {
                let exp_delay = (*base_ms as f64) * multiplier.powi(attempt.min(i32::MAX as u32) as i32);
                if exp_delay.is_finite() {
                    (exp_delay as u64).min(*max_ms)
                } else {
                    *max_ms
                }
            }
            Self::Custom {
                delays_ms,
                default_ms,
            } => delays_ms
                .get(attempt as usize)
                .copied()
                .unwrap_or(*default_ms),
        };
        Duration::from_millis(millis)
    }

    /// Largest delay this policy can produce
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        let millis = match self {
            Self::Fixed { delay_ms } => *delay_ms,
            Self::Linear { max_ms, .. } | Self::Exponential { max_ms, .. } => *max_ms,
            Self::Custom {
                delays_ms,
                default_ms,
            } => delays_ms.iter().copied().max().unwrap_or(0).max(*default_ms),
        };
        Duration::from_millis(millis)
    }

    /// Policy name for logs
    #[must_use]
    pub fn policy_name(&self) -> &'static str {
        match self {
            Self::Fixed { .. } => "fixed",
            Self::Linear { .. } => "linear",
            Self::Exponential { .. } => "exponential",
            Self::Custom { .. } => "custom",
        }
    }

    /// Validate the policy parameters
    pub fn validate(&self) -> ConfigResult<()> {
        match self {
            Self::Fixed { .. } | Self::Custom { .. } => {}
            Self::Linear { base_ms, max_ms } => {
                if *base_ms == 0 {
                    return Err(ConfigError::validation("linear backoff base must be positive"));
                }
                if max_ms < base_ms {
                    return Err(ConfigError::validation(
                        "linear backoff max must be at least the base delay",
                    ));
                }
            }
            Self::Exponential {
                base_ms,
                multiplier,
                max_ms,
            } => {
                if *base_ms == 0 {
                    return Err(ConfigError::validation(
                        "exponential backoff base must be positive",
                    ));
                }
                if !multiplier.is_finite() || *multiplier < 1.0 || *multiplier > 10.0 {
                    return Err(ConfigError::validation(
                        "exponential backoff multiplier must be between 1.0 and 10.0",
                    ));
                }
                if max_ms < base_ms {
                    return Err(ConfigError::validation(
                        "exponential backoff max must be at least the base delay",
                    ));
                }
            }
        }

        if self.max_delay() > Duration::from_millis(MAX_DELAY_CEILING_MS) {
            return Err(ConfigError::validation("backoff delay cannot exceed one day"));
        }

        Ok(())
    }
}

/// Jitter applied on top of a computed delay.
///
/// Jitter never lengthens the delay, so `nextRetryAt` stays within the policy's
/// `max_delay` of the failure instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterPolicy {
    /// Use the computed delay exactly
    #[default]
    None,
    /// random(0, delay)
    Full,
    /// delay/2 + random(0, delay/2)
    Equal,
}

impl JitterPolicy {
    /// Apply jitter to a delay
    #[must_use]
    pub fn apply(self, delay: Duration) -> Duration {
        let millis = duration_ms(delay);
        match self {
            Self::None => delay,
            Self::Full => {
                if millis == 0 {
                    return delay;
                }
                Duration::from_millis(fastrand::u64(0..=millis))
            }
            Self::Equal => {
                let half = millis / 2;
                let jitter = if half > 0 { fastrand::u64(0..=half) } else { 0 };
                Duration::from_millis((millis - half) + jitter)
            }
        }
    }
}

/// `from + delay`, saturating at the latest representable instant.
pub(crate) fn schedule_after(from: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    let delta = i64::try_from(duration_ms(delay))
        .ok()
        .and_then(TimeDelta::try_milliseconds)
        .unwrap_or(TimeDelta::MAX);
    from.checked_add_signed(delta)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
