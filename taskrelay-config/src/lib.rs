//! Layered configuration: built-in defaults, an optional TOML file, and
//! `TASKRELAY_`-prefixed environment variable overrides.

mod config;
mod error;
mod loader;

pub use config::{AppConfig, ExecutorConfig, ProcessorConfig, QueueConfig};
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
