//! `idempotencyKey -> jobId` mapping, at most one in-flight mapping per key.

use std::collections::HashMap;

use taskrelay_core::JobId;
use tokio::sync::RwLock;

/// Concurrent idempotency-key registry.
///
/// [`DeduplicationIndex::register`] is an atomic test-and-set: if a mapping
/// already exists for the key, registration fails and the existing owner is
/// left untouched.
pub struct DeduplicationIndex {
    in_flight: RwLock<HashMap<String, JobId>>,
}

impl DeduplicationIndex {
    pub fn new() -> Self {
        Self {
            in_flight: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_in_flight(&self, key: &str) -> Option<JobId> {
        self.in_flight.read().await.get(key).copied()
    }

    /// Register `job_id` under `key`. Returns `true` if this call claimed
    /// the key, `false` if another job already owns it.
    pub async fn register(&self, job_id: JobId, key: &str) -> bool {
        let mut in_flight = self.in_flight.write().await;
        if in_flight.contains_key(key) {
            return false;
        }
        in_flight.insert(key.to_string(), job_id);
        true
    }

    /// Remove every key mapped to `job_id`. A job registers under at most
    /// one key, but this sweeps defensively rather than trusting a
    /// one-to-one invariant the caller didn't enforce.
    pub async fn unregister(&self, job_id: JobId) {
        let mut in_flight = self.in_flight.write().await;
        in_flight.retain(|_, v| *v != job_id);
    }

    pub async fn clear_all(&self) {
        self.in_flight.write().await.clear();
    }
}

impl Default for DeduplicationIndex {
    fn default() -> Self {
        Self::new()
    }
}
