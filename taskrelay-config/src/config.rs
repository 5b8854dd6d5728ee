//! `AppConfig` and its sub-structs, one per collaborator in the job fabric.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_queue_size: usize,
    pub enable_prioritization: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            enable_prioritization: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub max_concurrency: usize,
    pub enable_retry: bool,
    pub retry_delay_ms: u64,
    pub shutdown_timeout_secs: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            enable_retry: true,
            retry_delay_ms: 500,
            shutdown_timeout_secs: 30,
        }
    }
}

impl ProcessorConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub max_step_retries: u32,
    pub max_fix_retries: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_step_retries: 2,
            max_fix_retries: 1,
        }
    }
}

/// The full, layered application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub queue: QueueConfig,
    pub processor: ProcessorConfig,
    pub executor: ExecutorConfig,
}

impl AppConfig {
    /// Rejects the out-of-range values the design calls out explicitly:
    /// zero concurrency, zero queue size, and (since durations here are
    /// unsigned) a retry delay that failed to parse as non-negative earlier
    /// in the load pipeline.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.processor.max_concurrency == 0 {
            return Err(ConfigError::Validation("processor.max_concurrency must be greater than zero".into()));
        }
        if self.queue.max_queue_size == 0 {
            return Err(ConfigError::Validation("queue.max_queue_size must be greater than zero".into()));
        }
        Ok(())
    }
}
