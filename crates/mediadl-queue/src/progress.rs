//! Progress reporting into the job store.

use std::sync::Arc;
use tracing::trace;

use mediadl_models::{JobId, JobStatus, ProgressSignal};

use crate::store::JobStore;

/// Writes capability progress into job records.
///
/// Reports are applied through the store's mutation path and only while
/// the record is active, so a worker's terminal write is never overridden.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    store: Arc<JobStore>,
}

impl ProgressReporter {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self { store }
    }

    /// Apply one signal. Returns whether the record changed.
    ///
    /// Unknown ids (record deleted mid-flight) are ignored.
    pub fn report(&self, id: &JobId, signal: ProgressSignal) -> bool {
        self.store
            .update(id, |job| {
                if job.status != JobStatus::Active {
                    return false;
                }

                let percentage = signal.percentage();
                let mut changed = false;
                match signal {
                    ProgressSignal::Finished { path: Some(path) } => {
                        changed |= job.partial_path.as_ref() != Some(&path);
                        job.partial_path = Some(path);
                    }
                    ProgressSignal::Title { title } => {
                        changed |= job.title.as_ref() != Some(&title);
                        job.title = Some(title);
                    }
                    _ => {}
                }

                if let Some(value) = percentage {
                    changed |= job.apply_progress(value);
                }

                if changed {
                    trace!(job_id = %job.id, progress = job.progress, "Progress updated");
                }
                changed
            })
            .unwrap_or(false)
    }

    /// Callback bound to one job, for handing to a capability.
    pub fn callback(&self, id: JobId) -> impl Fn(ProgressSignal) + Send + Sync + 'static {
        let reporter = self.clone();
        move |signal| {
            reporter.report(&id, signal);
        }
    }
}
