//! Shared data models for the mediadl job engine.
//!
//! This crate provides Serde-serializable types for:
//! - Job records, families and the status state machine
//! - Pass-through job options for retrieval and transform tools
//! - Progress signals reported by external capabilities
//! - Metadata of remote assets looked up before retrieval
//! - System statistics snapshots

pub mod error;
pub mod info;
pub mod job;
pub mod options;
pub mod progress;
pub mod stats;

// Re-export common types
pub use error::{ModelError, ModelResult};
pub use info::{FormatKind, MediaFormat, MediaInfo};
pub use job::{Job, JobFamily, JobId, JobSource, JobStatus};
pub use options::{JobOptions, ResizeMode, StreamSelection};
pub use progress::{
    ProgressSignal, COMPLETE_PROGRESS, FINALIZING_PROGRESS, MAX_REPORTED_PROGRESS,
};
pub use stats::SystemStats;
