//! Idempotent process-wide tracing setup.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a formatting subscriber driven by `RUST_LOG` (default `info`).
/// Safe to call more than once; only the first call takes effect.
pub fn init() {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        if tracing_subscriber::fmt().with_env_filter(env_filter).try_init().is_err() {
            tracing::debug!("global tracing subscriber already initialized, skipping");
        }
    });
}
