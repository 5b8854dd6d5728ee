//! Backoff strategies for [`crate::retry::RetryPolicy`].

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy selectable via [`crate::retry::RetryPolicy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed,

    /// Linear increase: delay = initial_delay * attempt.
    Linear,

    /// Exponential increase: delay = initial_delay * base^(attempt-1).
    Exponential { base: f64 },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::Exponential { base: 2.0 }
    }
}

/// Computes the delay before a given retry attempt (1-indexed).
pub struct BackoffCalculator {
    strategy: BackoffStrategy,
    initial_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl BackoffCalculator {
    pub fn new(strategy: BackoffStrategy, initial_delay: Duration, max_delay: Duration, jitter: bool) -> Self {
        Self {
            strategy,
            initial_delay,
            max_delay,
            jitter,
        }
    }

    /// Delay for `attempt` (1-indexed); delay is `initial_delay` at
    /// `attempt == 1`, matching the "delay = base at retryCount = 0" rule
    /// when the caller treats retry_count as 0-indexed and attempt as
    /// retry_count + 1.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.calculate_base_delay(attempt);
        let capped = base_delay.min(self.max_delay);
        if self.jitter {
            self.add_jitter(capped)
        } else {
            capped
        }
    }

    fn calculate_base_delay(&self, attempt: u32) -> Duration {
        match &self.strategy {
            BackoffStrategy::Fixed => self.initial_delay,
            BackoffStrategy::Linear => self.initial_delay * attempt.max(1),
            BackoffStrategy::Exponential { base } => {
                if attempt == 0 {
                    return Duration::ZERO;
                }
                let multiplier = base.powi(attempt as i32 - 1);
                Duration::from_nanos((self.initial_delay.as_nanos() as f64 * multiplier) as u64)
            }
        }
    }

    fn add_jitter(&self, delay: Duration) -> Duration {
        let mut rng = rand::thread_rng();
        let jitter_factor = rng.gen_range(0.8..1.2);
        Duration::from_nanos((delay.as_nanos() as f64 * jitter_factor) as u64)
    }
}
