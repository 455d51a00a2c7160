//! In-memory job orchestration primitives.
//!
//! This crate provides:
//! - The job store (concurrent registry keyed by job id)
//! - Bounded per-family FIFO queues with non-blocking admission
//! - Permit pools bounding concurrent external invocations
//! - The progress reporter writing capability progress into the store

pub mod error;
pub mod permit;
pub mod progress;
pub mod queue;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use permit::PermitPool;
pub use progress::ProgressReporter;
pub use queue::JobQueue;
pub use store::JobStore;
