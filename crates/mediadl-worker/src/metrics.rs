//! Prometheus metrics for the job engine.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

use mediadl_models::{JobFamily, JobStatus};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_SUBMITTED_TOTAL: &str = "mediadl_jobs_submitted_total";
    pub const JOBS_REJECTED_TOTAL: &str = "mediadl_jobs_rejected_total";
    pub const JOBS_FINISHED_TOTAL: &str = "mediadl_jobs_finished_total";
    pub const JOB_DURATION_SECONDS: &str = "mediadl_job_duration_seconds";
    pub const QUEUE_LENGTH: &str = "mediadl_queue_length";
    pub const SWEEPER_FILES_REMOVED_TOTAL: &str = "mediadl_sweeper_files_removed_total";
    pub const SWEEPER_RECORDS_REMOVED_TOTAL: &str = "mediadl_sweeper_records_removed_total";
}

/// Install the Prometheus recorder with an HTTP scrape listener.
pub fn install_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Record an admitted submission.
pub fn record_job_submitted(family: JobFamily) {
    let labels = [("family", family.as_str().to_string())];
    counter!(names::JOBS_SUBMITTED_TOTAL, &labels).increment(1);
}

/// Record a submission refused at admission.
pub fn record_job_rejected(family: JobFamily, reason: &str) {
    let labels = [
        ("family", family.as_str().to_string()),
        ("reason", reason.to_string()),
    ];
    counter!(names::JOBS_REJECTED_TOTAL, &labels).increment(1);
}

/// Record a terminal transition and the time spent active.
pub fn record_job_finished(family: JobFamily, status: JobStatus, duration_secs: f64) {
    let labels = [
        ("family", family.as_str().to_string()),
        ("status", status.as_str().to_string()),
    ];
    counter!(names::JOBS_FINISHED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record the current queue length.
pub fn record_queue_length(family: JobFamily, length: usize) {
    let labels = [("family", family.as_str().to_string())];
    gauge!(names::QUEUE_LENGTH, &labels).set(length as f64);
}

/// Record the outcome of one sweeper pass.
pub fn record_sweep(files_removed: usize, records_removed: usize) {
    counter!(names::SWEEPER_FILES_REMOVED_TOTAL).increment(files_removed as u64);
    counter!(names::SWEEPER_RECORDS_REMOVED_TOTAL).increment(records_removed as u64);
}
