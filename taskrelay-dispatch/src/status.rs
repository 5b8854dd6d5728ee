//! Durable-ish record of per-job lifecycle state, with secondary indexes by
//! status, type, and source.

use std::collections::{HashMap, HashSet};

use taskrelay_core::{JobId, JobStatus, JobStatusInfo};
use tokio::sync::RwLock;

/// Filter + pagination for [`JobStatusStore::list`].
#[derive(Debug, Clone, Default)]
pub struct StatusFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<String>,
    pub source: Option<String>,
    pub skip: usize,
    pub take: Option<usize>,
}

/// Aggregate counts per status, as returned by [`JobStatusStore::metrics`].
#[derive(Debug, Clone, Default)]
pub struct JobStatusMetrics {
    pub counts: HashMap<JobStatus, usize>,
}

/// `jobId -> JobStatusInfo`, plus `status/type/source -> [jobId]` indexes.
pub struct JobStatusStore {
    records: RwLock<HashMap<JobId, JobStatusInfo>>,
    by_status: RwLock<HashMap<JobStatus, HashSet<JobId>>>,
    by_type: RwLock<HashMap<String, HashSet<JobId>>>,
    by_source: RwLock<HashMap<String, HashSet<JobId>>>,
}

impl JobStatusStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            by_status: RwLock::new(HashMap::new()),
            by_type: RwLock::new(HashMap::new()),
            by_source: RwLock::new(HashMap::new()),
        }
    }

    pub async fn set(&self, info: JobStatusInfo) {
        let mut records = self.records.write().await;
        let mut by_status = self.by_status.write().await;
        let mut by_type = self.by_type.write().await;
        let mut by_source = self.by_source.write().await;

        if let Some(prev) = records.get(&info.job_id) {
            if let Some(set) = by_status.get_mut(&prev.status) {
                set.remove(&info.job_id);
            }
            if let Some(set) = by_type.get_mut(&prev.job_type) {
                set.remove(&info.job_id);
            }
            if let Some(set) = by_source.get_mut(&prev.source) {
                set.remove(&info.job_id);
            }
        }

        by_status.entry(info.status).or_default().insert(info.job_id);
        by_type.entry(info.job_type.clone()).or_default().insert(info.job_id);
        by_source.entry(info.source.clone()).or_default().insert(info.job_id);

        records.insert(info.job_id, info);
    }

    pub async fn get(&self, job_id: JobId) -> Option<JobStatusInfo> {
        self.records.read().await.get(&job_id).cloned()
    }

    pub async fn delete(&self, job_id: JobId) -> Option<JobStatusInfo> {
        let mut records = self.records.write().await;
        let removed = records.remove(&job_id)?;

        let mut by_status = self.by_status.write().await;
        if let Some(set) = by_status.get_mut(&removed.status) {
            set.remove(&job_id);
        }
        let mut by_type = self.by_type.write().await;
        if let Some(set) = by_type.get_mut(&removed.job_type) {
            set.remove(&job_id);
        }
        let mut by_source = self.by_source.write().await;
        if let Some(set) = by_source.get_mut(&removed.source) {
            set.remove(&job_id);
        }

        Some(removed)
    }

    pub async fn list_by_status(&self, status: JobStatus, skip: usize, take: usize) -> Vec<JobStatusInfo> {
        self.list(StatusFilter {
            status: Some(status),
            skip,
            take: Some(take),
            ..Default::default()
        })
        .await
    }

    pub async fn list_by_type(&self, job_type: &str) -> Vec<JobStatusInfo> {
        self.list(StatusFilter {
            job_type: Some(job_type.to_string()),
            ..Default::default()
        })
        .await
    }

    pub async fn list_by_source(&self, source: &str) -> Vec<JobStatusInfo> {
        self.list(StatusFilter {
            source: Some(source.to_string()),
            ..Default::default()
        })
        .await
    }

    /// Apply `filter`, ordering by descending `started_at` (jobs never
    /// started sort last) and paginating with `skip`/`take`.
    pub async fn list(&self, filter: StatusFilter) -> Vec<JobStatusInfo> {
        let records = self.records.read().await;
        let mut matched: Vec<JobStatusInfo> = records
            .values()
            .filter(|info| filter.status.map_or(true, |s| info.status == s))
            .filter(|info| filter.job_type.as_deref().map_or(true, |t| info.job_type == t))
            .filter(|info| filter.source.as_deref().map_or(true, |s| info.source == s))
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        let take = filter.take.unwrap_or(matched.len());
        matched.into_iter().skip(filter.skip).take(take).collect()
    }

    pub async fn metrics(&self) -> JobStatusMetrics {
        let by_status = self.by_status.read().await;
        let counts = by_status.iter().map(|(status, ids)| (*status, ids.len())).collect();
        JobStatusMetrics { counts }
    }
}

impl Default for JobStatusStore {
    fn default() -> Self {
        Self::new()
    }
}
