//! Progress signals reported by external capabilities.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Highest value a determinate ratio can map to while a job is active.
pub const MAX_REPORTED_PROGRESS: f64 = 99.0;

/// Value recorded for indeterminate "processing/finalizing" phases.
pub const FINALIZING_PROGRESS: f64 = 99.5;

/// Value set by the worker when a job completes.
pub const COMPLETE_PROGRESS: f64 = 100.0;

/// A single progress report from a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressSignal {
    /// Determinate progress: `done` out of `total` units (bytes, ms).
    Ratio { done: u64, total: u64 },
    /// Indeterminate phase with no ratio (merging, extracting audio, ...).
    Phase { name: String },
    /// The tool finished writing a file; the path is provisional until the
    /// worker verifies it.
    Finished { path: Option<PathBuf> },
    /// Human title of the asset, once known.
    Title { title: String },
}

impl ProgressSignal {
    pub fn ratio(done: u64, total: u64) -> Self {
        Self::Ratio { done, total }
    }

    pub fn phase(name: impl Into<String>) -> Self {
        Self::Phase { name: name.into() }
    }

    pub fn finished(path: Option<PathBuf>) -> Self {
        Self::Finished { path }
    }

    /// Progress percentage this signal maps to, if any.
    ///
    /// Ratios are clamped to [`MAX_REPORTED_PROGRESS`]; phases and finished
    /// markers map to [`FINALIZING_PROGRESS`]. A ratio with an unknown total
    /// carries no percentage.
    pub fn percentage(&self) -> Option<f64> {
        match self {
            ProgressSignal::Ratio { done, total } => {
                if *total == 0 {
                    return None;
                }
                let pct = (*done as f64 / *total as f64) * 100.0;
                Some(pct.clamp(0.0, MAX_REPORTED_PROGRESS))
            }
            ProgressSignal::Phase { .. } | ProgressSignal::Finished { .. } => {
                Some(FINALIZING_PROGRESS)
            }
            ProgressSignal::Title { .. } => None,
        }
    }
}
