//! Retry backoff policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff configuration for failed jobs.
///
/// The delay before the retry following failed attempt `n` is
/// `base_delay * 2^n`, capped at `max_delay`: with the one-minute default
/// base, the first retry waits ~2 minutes, the second ~4, and so on.
/// How many attempts a job gets is the job's own `max_attempts`, not a
/// policy concern — the policy only shapes the spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60 * 60),
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Delay before the retry that follows failed attempt number `attempts`
    /// (1-indexed: pass the counter *after* incrementing it).
    pub fn delay_after(&self, attempts: u32) -> Duration {
        // Saturate instead of overflowing for absurd attempt counts.
        let factor = 2u64.checked_pow(attempts).unwrap_or(u64::MAX);
        let delayed = self
            .base_delay
            .as_secs()
            .saturating_mul(factor);
        Duration::from_secs(delayed).min(self.max_delay)
    }
}
