//! Media job engine.
//!
//! This crate provides:
//! - The engine API: submit, query, list, delete, stats, info
//! - Per-family worker pools with permit-bounded execution
//! - Deadline enforcement and cancellation of external invocations
//! - The cleanup sweeper for expired artifacts and records
//! - A JSON line driver for embedding the engine as a subprocess

pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
mod executor;
pub mod logging;
pub mod metrics;
pub mod sweeper;
pub mod timeout;

pub use config::{EngineConfig, FamilyConfig, ToolPaths};
pub use engine::Engine;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use sweeper::{CleanupSweeper, SweepReport};
pub use timeout::{GuardOutcome, Interrupt, TimeoutGuard};
