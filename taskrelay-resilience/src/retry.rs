//! Retry eligibility and delay computation for the job processor.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::{BackoffCalculator, BackoffStrategy};

/// Pure retry policy: computes eligibility and delay from attempt counters.
///
/// `should_retry` is the conjunction described in the design:
/// `enabled ∧ handler_should_retry ∧ retry_count < max_retries`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    pub backoff_strategy: BackoffStrategy,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_strategy: BackoffStrategy::default(),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn linear(base_delay: Duration) -> Self {
        Self {
            enabled: true,
            base_delay,
            max_delay: base_delay * 100,
            backoff_strategy: BackoffStrategy::Linear,
            jitter: false,
        }
    }

    /// `enabled ∧ handler_should_retry ∧ retry_count < max_retries`.
    pub fn should_retry(&self, retry_count: u32, max_retries: u32, handler_should_retry: bool) -> bool {
        self.enabled && handler_should_retry && retry_count < max_retries
    }

    /// Delay before the retry attempt following `retry_count` (0-indexed).
    /// `delay_for_attempt(0) == base_delay` regardless of strategy.
    pub fn delay_for_attempt(&self, retry_count: u32) -> Duration {
        let calculator = BackoffCalculator::new(
            self.backoff_strategy.clone(),
            self.base_delay,
            self.max_delay,
            self.jitter,
        );
        calculator.calculate_delay(retry_count + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_policy_never_retries() {
        let policy = RetryPolicy::disabled();
        assert!(!policy.should_retry(0, 5, true));
    }

    #[test]
    fn handler_veto_is_final() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(0, 5, false));
    }

    #[test]
    fn budget_exhaustion_stops_retries() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1, 2, true));
        assert!(!policy.should_retry(2, 2, true));
    }

    #[test]
    fn delay_at_zero_retries_equals_base() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for_attempt(0), policy.base_delay);
    }
}
