//! Builds an [`AppConfig`] from defaults, an optional TOML file, and
//! `TASKRELAY_`-prefixed environment variable overrides, in that order of
//! increasing precedence.

use std::path::Path;

use crate::config::AppConfig;
use crate::error::{ConfigError, ConfigResult};

pub struct ConfigLoader {
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            env_prefix: "TASKRELAY".to_string(),
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            env_prefix: prefix.into(),
        }
    }

    /// Defaults, optionally overlaid by `path` if given, then environment
    /// overrides, then validated.
    pub fn load(&self, path: Option<impl AsRef<Path>>) -> ConfigResult<AppConfig> {
        let mut config = match path {
            Some(path) => self.from_file(path)?,
            None => AppConfig::default(),
        };
        self.apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<AppConfig> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    fn apply_env_overrides(&self, config: &mut AppConfig) -> ConfigResult<()> {
        if let Some(value) = self.env_var("MAX_QUEUE_SIZE") {
            config.queue.max_queue_size = self.parse_env("MAX_QUEUE_SIZE", &value)?;
        }
        if let Some(value) = self.env_var("ENABLE_PRIORITIZATION") {
            config.queue.enable_prioritization = self.parse_env("ENABLE_PRIORITIZATION", &value)?;
        }
        if let Some(value) = self.env_var("MAX_CONCURRENCY") {
            config.processor.max_concurrency = self.parse_env("MAX_CONCURRENCY", &value)?;
        }
        if let Some(value) = self.env_var("ENABLE_RETRY") {
            config.processor.enable_retry = self.parse_env("ENABLE_RETRY", &value)?;
        }
        if let Some(value) = self.env_var("RETRY_DELAY_MS") {
            config.processor.retry_delay_ms = self.parse_env("RETRY_DELAY_MS", &value)?;
        }
        if let Some(value) = self.env_var("SHUTDOWN_TIMEOUT_SECS") {
            config.processor.shutdown_timeout_secs = self.parse_env("SHUTDOWN_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = self.env_var("MAX_STEP_RETRIES") {
            config.executor.max_step_retries = self.parse_env("MAX_STEP_RETRIES", &value)?;
        }
        if let Some(value) = self.env_var("MAX_FIX_RETRIES") {
            config.executor.max_fix_retries = self.parse_env("MAX_FIX_RETRIES", &value)?;
        }
        Ok(())
    }

    fn env_var(&self, suffix: &str) -> Option<String> {
        std::env::var(format!("{}_{suffix}", self.env_prefix)).ok()
    }

    fn parse_env<T: std::str::FromStr>(&self, suffix: &str, raw: &str) -> ConfigResult<T>
    where
        T::Err: std::fmt::Display,
    {
        raw.parse().map_err(|err: T::Err| ConfigError::EnvVar {
            name: format!("{}_{suffix}", self.env_prefix),
            message: err.to_string(),
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // std::env is process-global; serialize these tests so they don't clobber
    // each other's variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_pass_validation() {
        let _guard = ENV_LOCK.lock().unwrap();
        let config = ConfigLoader::new().load(None::<&Path>).unwrap();
        assert_eq!(config.processor.max_concurrency, 4);
    }

    #[test]
    fn env_override_takes_precedence_over_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("TASKRELAY_MAX_CONCURRENCY", "16");
        let config = ConfigLoader::new().load(None::<&Path>).unwrap();
        std::env::remove_var("TASKRELAY_MAX_CONCURRENCY");
        assert_eq!(config.processor.max_concurrency, 16);
    }

    #[test]
    fn zero_concurrency_fails_validation() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("TASKRELAY_MAX_CONCURRENCY", "0");
        let result = ConfigLoader::new().load(None::<&Path>);
        std::env::remove_var("TASKRELAY_MAX_CONCURRENCY");
        assert!(result.is_err());
    }

    #[test]
    fn malformed_env_var_is_reported() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("TASKRELAY_MAX_CONCURRENCY", "not-a-number");
        let result = ConfigLoader::new().load(None::<&Path>);
        std::env::remove_var("TASKRELAY_MAX_CONCURRENCY");
        assert!(matches!(result, Err(ConfigError::EnvVar { .. })));
    }

    #[test]
    fn file_overlay_then_env_override_wins() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = std::env::temp_dir().join(format!("taskrelay-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[processor]\nmax_concurrency = 8\n").unwrap();

        std::env::set_var("TASKRELAY_MAX_CONCURRENCY", "32");
        let config = ConfigLoader::new().load(Some(&path)).unwrap();
        std::env::remove_var("TASKRELAY_MAX_CONCURRENCY");

        assert_eq!(config.processor.max_concurrency, 32);
    }
}
