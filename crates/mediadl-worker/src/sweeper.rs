//! Background service reclaiming expired artifacts and stale records.
//!
//! Each pass:
//! - Removes terminal records whose `completed_at` is older than the record
//!   retention window, together with their backing file
//! - Removes files under the artifact root older than the artifact
//!   retention window that no tracked record references
//!
//! Files owned by a non-terminal job are never touched. Per-item errors are
//! logged and the pass continues.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use mediadl_media::ArtifactStorage;
use mediadl_models::JobId;
use mediadl_queue::JobStore;

use crate::metrics;
use crate::timeout::signalled;

/// Counts from one sweeper pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub records_removed: usize,
    pub files_removed: usize,
    pub errors: usize,
}

/// Cleanup sweeper service.
pub struct CleanupSweeper {
    store: Arc<JobStore>,
    storage: Arc<ArtifactStorage>,
    interval: Duration,
    artifact_retention: Duration,
    record_retention: Duration,
}

impl CleanupSweeper {
    pub fn new(
        store: Arc<JobStore>,
        storage: Arc<ArtifactStorage>,
        interval: Duration,
        artifact_retention: Duration,
        record_retention: Duration,
    ) -> Self {
        Self {
            store,
            storage,
            interval,
            artifact_retention,
            record_retention,
        }
    }

    /// Run passes at a fixed interval until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting cleanup sweeper (interval: {:?}, artifacts: {:?}, records: {:?})",
            self.interval, self.artifact_retention, self.record_retention
        );

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.sweep_once(Utc::now()).await;
                    if report.records_removed > 0 || report.files_removed > 0 {
                        info!(
                            records = report.records_removed,
                            files = report.files_removed,
                            errors = report.errors,
                            "Cleanup pass finished"
                        );
                    }
                }
                _ = signalled(&mut shutdown) => break,
            }
        }

        info!("Cleanup sweeper stopped");
    }

    /// Run a single pass as of `now`.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        self.sweep_records(now, &mut report).await;
        self.sweep_files(now, &mut report).await;

        metrics::record_sweep(report.files_removed, report.records_removed);
        report
    }

    async fn sweep_records(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        let cutoff = now - to_chrono(self.record_retention);

        for job in self.store.list() {
            let expired = job.is_terminal() && job.completed_at.is_some_and(|at| at < cutoff);
            if !expired {
                continue;
            }

            // Removed concurrently by a delete
            let Some(job) = self.store.remove(&job.id) else {
                continue;
            };
            report.records_removed += 1;
            debug!(job_id = %job.id, status = %job.status, "Removed expired job record");

            if let Some(path) = job.backing_file() {
                match self.storage.delete(path).await {
                    Ok(true) => report.files_removed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        report.errors += 1;
                        error!(job_id = %job.id, path = %path.display(), "Failed to remove job file: {}", e);
                    }
                }
            }
        }
    }

    async fn sweep_files(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        let cutoff = now - to_chrono(self.artifact_retention);

        let jobs = self.store.list();
        let referenced: HashSet<PathBuf> = jobs
            .iter()
            .flat_map(|j| [j.output_path.clone(), j.partial_path.clone()])
            .flatten()
            .collect();
        let live_ids: Vec<JobId> = jobs
            .iter()
            .filter(|j| !j.is_terminal())
            .map(|j| j.id.clone())
            .collect();

        let entries = match self.storage.list().await {
            Ok(entries) => entries,
            Err(e) => {
                report.errors += 1;
                warn!("Failed to list artifact root: {}", e);
                return;
            }
        };

        for entry in entries {
            let modified: DateTime<Utc> = entry.modified.into();
            if modified >= cutoff || referenced.contains(&entry.path) {
                continue;
            }
            let name = entry.file_name();
            if live_ids.iter().any(|id| name.contains(id.as_str())) {
                continue;
            }

            match self.storage.delete(&entry.path).await {
                Ok(true) => {
                    report.files_removed += 1;
                    debug!(path = %entry.path.display(), "Removed expired artifact");
                }
                Ok(false) => {}
                Err(e) => {
                    report.errors += 1;
                    error!(path = %entry.path.display(), "Failed to remove artifact: {}", e);
                }
            }
        }
    }
}

fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::MAX)
}
