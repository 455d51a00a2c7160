//! Bounded per-family job queue.
//!
//! Admission never waits: a slot is reserved with `try_reserve` before the
//! record is created, so a full queue rejects the submission and no record
//! ever becomes visible for it.

use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tracing::debug;

use mediadl_models::{Job, JobFamily, JobId};

use crate::error::{QueueError, QueueResult};
use crate::store::JobStore;

/// Fixed-capacity FIFO of job ids for one family.
///
/// The receiving half is shared by all workers of the family; each dequeue
/// hands an id to exactly one worker.
#[derive(Debug)]
pub struct JobQueue {
    family: JobFamily,
    capacity: usize,
    sender: mpsc::Sender<JobId>,
    receiver: Arc<Mutex<mpsc::Receiver<JobId>>>,
}

impl JobQueue {
    /// Create a queue holding at most `capacity` ids (minimum 1).
    pub fn new(family: JobFamily, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            family,
            capacity,
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    pub fn family(&self) -> JobFamily {
        self.family
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of ids waiting to be dequeued.
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Admit a pending job: reserve a slot, mark it queued, store it, enqueue.
    pub fn admit(&self, store: &JobStore, mut job: Job) -> QueueResult<JobId> {
        let slot = self.sender.try_reserve().map_err(|e| match e {
            TrySendError::Full(()) => QueueError::queue_full(self.family, self.capacity),
            TrySendError::Closed(()) => QueueError::Closed(self.family),
        })?;

        job.enqueue()?;
        let id = store.create(job)?;
        slot.send(id.clone());

        debug!(job_id = %id, family = %self.family, queued = self.len(), "Job admitted");
        Ok(id)
    }

    /// Wait for the next id in FIFO order.
    ///
    /// Returns `None` only once the queue is closed and drained.
    pub async fn dequeue(&self) -> Option<JobId> {
        self.receiver.lock().await.recv().await
    }
}
