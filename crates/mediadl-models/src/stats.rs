//! System statistics snapshot.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{Job, JobStatus};

/// Point-in-time statistics of the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SystemStats {
    /// Jobs currently held by a worker
    pub active_jobs: usize,
    /// Jobs waiting in a queue
    pub queued_jobs: usize,
    /// Completed jobs still tracked
    pub completed_jobs: usize,
    /// Failed, timed out or canceled jobs still tracked
    pub failed_jobs: usize,
    /// All tracked jobs
    pub total_jobs: usize,
    /// Queued items over total queue capacity, in percent
    pub queue_utilization_percent: f64,
    /// Used space of the disk holding the artifact root, in percent
    pub disk_usage_percent: f64,
    /// Seconds since the engine was created
    pub uptime_seconds: f64,
    /// Engine version
    pub version: String,
}

impl SystemStats {
    /// Count jobs by status bucket.
    pub fn tally<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut stats = Self::default();
        for job in jobs {
            stats.total_jobs += 1;
            match job.status {
                JobStatus::Active => stats.active_jobs += 1,
                JobStatus::Pending | JobStatus::Queued => stats.queued_jobs += 1,
                JobStatus::Completed => stats.completed_jobs += 1,
                JobStatus::Failed | JobStatus::Timeout | JobStatus::Canceled => {
                    stats.failed_jobs += 1
                }
            }
        }
        stats
    }
}
