//! Graceful shutdown coordination for the worker pool.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Tracks in-flight jobs and coordinates a bounded drain on shutdown.
///
/// Shutdown stops new dequeues immediately (via [`ShutdownCoordinator::token`])
/// but in-flight jobs derive their cancellation from a separate token
/// ([`ShutdownCoordinator::job_cancellation_token`]) that only fires once the
/// configured grace period elapses, so a job already running gets the full
/// timeout to finish normally before being force-cancelled.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    force_cancel_token: CancellationToken,
    active_jobs: Arc<AtomicU32>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            force_cancel_token: CancellationToken::new(),
            active_jobs: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Cancellation token observed by the dequeue loop: fires the moment
    /// shutdown is requested, stopping new work from being picked up.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancellation token in-flight jobs should derive their per-job token
    /// from. Fires only after the shutdown grace period elapses with jobs
    /// still active, not when shutdown is first requested.
    pub fn job_cancellation_token(&self) -> CancellationToken {
        self.force_cancel_token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn job_started(&self) -> JobGuard {
        self.active_jobs.fetch_add(1, Ordering::SeqCst);
        JobGuard {
            active_jobs: self.active_jobs.clone(),
        }
    }

    pub fn active_job_count(&self) -> u32 {
        self.active_jobs.load(Ordering::SeqCst)
    }

    /// Signal shutdown and wait up to `timeout` for all in-flight jobs to
    /// complete. Returns `true` if the drain finished cleanly, `false` if
    /// the timeout elapsed with jobs still active (the caller should then
    /// force-cancel remaining workers).
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        info!("shutdown requested, stopping new dequeues");
        self.token.cancel();

        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.active_job_count() == 0 {
                info!("graceful shutdown completed, no jobs remaining");
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let remaining = self.active_job_count();
        if remaining > 0 {
            warn!(remaining, "shutdown timeout elapsed, force-cancelling in-flight jobs");
            self.force_cancel_token.cancel();
            false
        } else {
            true
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard decrementing the active-job counter when a worker finishes.
pub struct JobGuard {
    active_jobs: Arc<AtomicU32>,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.active_jobs.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("shutdown timed out with {0} jobs still active")]
    TimedOut(u32),
}
