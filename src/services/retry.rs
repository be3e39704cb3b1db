//! Retry ceiling and exponential backoff for transient failures.
//!
//! Backoff doubles with each dispatched attempt and is capped:
//! `base × 2^attempt_count`, then ± `jitter_ratio` of random jitter. With the
//! defaults (30s base, 30m cap) the retries after attempts 1..5 wait roughly
//! 1m → 2m → 4m → 8m → 16m.

use rand::Rng;
use std::time::Duration;

use crate::domain::models::RetryConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,

    pub base_delay_ms: u64,

    pub max_delay_ms: u64,

    /// Relative jitter, clamped to 0.0 - 1.0
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            jitter_ratio: 0.0,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, config.base_delay_ms, config.max_delay_ms)
            .with_jitter(config.jitter_ratio)
    }

    pub fn with_jitter(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Whether a task that has been dispatched `attempt_count` times may be
    /// retried after a transient failure.
    pub fn allows_retry(&self, attempt_count: u32) -> bool {
        attempt_count <= self.max_retries
    }

    /// Deterministic part of the delay.
    pub fn backoff_without_jitter(&self, attempt_count: u32) -> Duration {
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt_count))
            .min(self.max_delay_ms);

        Duration::from_millis(delay_ms)
    }

    /// Delay before the next attempt, jittered and never above the cap.
    pub fn backoff(&self, attempt_count: u32) -> Duration {
        let base = self.backoff_without_jitter(attempt_count);
        if self.jitter_ratio <= 0.0 || base.is_zero() {
            return base;
        }

        let offset = rand::thread_rng().gen_range(-self.jitter_ratio..=self.jitter_ratio);
        let jittered = base.as_secs_f64() * (1.0 + offset);
        let capped = jittered.clamp(0.0, Duration::from_millis(self.max_delay_ms).as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_backoff_calculation() {
        let policy = RetryPolicy::new(5, 30_000, 1_800_000);

        assert_eq!(policy.backoff_without_jitter(0), Duration::from_secs(30));
        assert_eq!(policy.backoff_without_jitter(1), Duration::from_secs(60));
        assert_eq!(policy.backoff_without_jitter(2), Duration::from_secs(120));
        assert_eq!(policy.backoff_without_jitter(5), Duration::from_secs(960));
        assert_eq!(policy.backoff_without_jitter(6), Duration::from_secs(1800)); // capped
        assert_eq!(policy.backoff_without_jitter(63), Duration::from_secs(1800));
        assert_eq!(policy.backoff_without_jitter(200), Duration::from_secs(1800));
    }

    #[test]
    fn test_retry_ceiling() {
        let policy = RetryPolicy::new(5, 1, 10);

        // Attempts 1..=5 may be followed by a retry; the sixth may not.
        for attempt in 1..=5 {
            assert!(policy.allows_retry(attempt));
        }
        assert!(!policy.allows_retry(6));

        let none = RetryPolicy::new(0, 1, 10);
        assert!(!none.allows_retry(1));
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let policy = RetryPolicy::new(5, 1000, 60_000);
        assert_eq!(policy.backoff(2), policy.backoff_without_jitter(2));
    }

    #[test]
    fn test_from_config_clamps_jitter() {
        let config = RetryConfig {
            jitter_ratio: 3.0,
            ..RetryConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert!((policy.jitter_ratio - 1.0).abs() < f64::EPSILON);
        assert_eq!(policy.max_retries, 5);
    }

    proptest! {
        #[test]
        fn prop_jittered_backoff_within_bounds(
            attempt in 0u32..20,
            base in 1u64..60_000,
            ratio in 0.0f64..1.0,
        ) {
            let policy = RetryPolicy::new(5, base, 1_800_000).with_jitter(ratio);
            let nominal = policy.backoff_without_jitter(attempt).as_secs_f64();
            let delay = policy.backoff(attempt).as_secs_f64();

            prop_assert!(delay <= 1800.0 + 1e-6);
            prop_assert!(delay >= nominal * (1.0 - ratio) - 1e-6);
            prop_assert!(delay <= nominal * (1.0 + ratio) + 1e-6);
        }

        #[test]
        fn prop_backoff_is_monotonic(attempt in 0u32..40) {
            let policy = RetryPolicy::new(5, 30_000, 1_800_000);
            prop_assert!(
                policy.backoff_without_jitter(attempt) <= policy.backoff_without_jitter(attempt + 1)
            );
        }
    }
}
