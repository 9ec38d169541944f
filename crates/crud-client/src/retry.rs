//! Retry policy with exponential backoff.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the first failure
    pub max_attempts: u32,

    /// Backoff before the first retry, in milliseconds
    pub initial_backoff_ms: u64,

    /// Upper bound on any single backoff, in milliseconds
    pub max_backoff_ms: u64,

    /// Backoff multiplier
    pub multiplier: f64,

    /// Add up to 30% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        #[allow(clippy::cast_precision_loss)]
        let ms = (self.initial_backoff_ms as f64 * self.multiplier.powi(exponent))
            .min(self.max_backoff_ms as f64);
        Duration::from_millis(ms as u64)
    }

    /// Delay before retry number `attempt`, jitter applied.
    pub fn delay(&self, attempt: u32) -> Duration {
        let mut delay = self.base_delay(attempt);
        if self.jitter {
            let jitter = rand::thread_rng().gen_range(0.0..0.3);
            #[allow(clippy::cast_precision_loss)]
            let jitter_ms = (delay.as_millis() as f64 * jitter) as u64;
            delay += Duration::from_millis(jitter_ms);
        }
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_backoff_ms, 100);
        assert_eq!(policy.max_backoff_ms, 10_000);
        assert!((policy.multiplier - 2.0).abs() < f64::EPSILON);
        assert!(policy.jitter);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_backoff_ms: 500,
            jitter: false,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(400));
        assert_eq!(policy.delay(4), Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_within_thirty_percent() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let d = policy.delay(2);
            assert!(d >= Duration::from_millis(200));
            assert!(d < Duration::from_millis(260));
        }
    }

    #[test]
    fn none_never_retries() {
        assert_eq!(RetryPolicy::none().max_attempts, 0);
    }
}
