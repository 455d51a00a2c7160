//! In-memory job store.
//!
//! Every mutation of a record goes through [`JobStore::update`], which holds
//! the map-level write lock for the duration of the closure. Readers get
//! cloned snapshots and never hold the lock across an await point.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use mediadl_models::{Job, JobId};

use crate::error::{QueueError, QueueResult};

/// Concurrent registry of job records keyed by id.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record. Never overwrites an existing id.
    pub fn create(&self, job: Job) -> QueueResult<JobId> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&job.id) {
            return Err(QueueError::DuplicateJob(job.id));
        }
        let id = job.id.clone();
        jobs.insert(id.clone(), job);
        Ok(id)
    }

    /// Snapshot of one record.
    pub fn get(&self, id: &JobId) -> QueueResult<Job> {
        self.jobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| QueueError::not_found(id))
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.jobs.read().contains_key(id)
    }

    /// Point-in-time snapshot of all records, oldest first.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    /// Apply `f` to a record under the write lock.
    pub fn update<F, R>(&self, id: &JobId, f: F) -> QueueResult<R>
    where
        F: FnOnce(&mut Job) -> R,
    {
        let mut jobs = self.jobs.write();
        let job = jobs.get_mut(id).ok_or_else(|| QueueError::not_found(id))?;
        Ok(f(job))
    }

    /// Remove a record without touching its file.
    pub fn remove(&self, id: &JobId) -> Option<Job> {
        self.jobs.write().remove(id)
    }

    /// Remove a record and its backing file.
    ///
    /// File removal is best-effort: failures are logged and the record is
    /// still gone. Returns `false` if the id is unknown.
    pub async fn delete(&self, id: &JobId) -> bool {
        let Some(job) = self.remove(id) else {
            return false;
        };

        if let Some(path) = job.backing_file() {
            remove_backing_file(id, path).await;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

/// Best-effort removal of a record's file. Absence is not an error.
pub async fn remove_backing_file(id: &JobId, path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(job_id = %id, path = %path.display(), "Removed job file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            job_id = %id,
            path = %path.display(),
            error = %e,
            "Failed to remove job file"
        ),
    }
}
