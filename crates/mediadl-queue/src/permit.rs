//! Concurrency permits bounding simultaneous external invocations.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use mediadl_models::JobFamily;

use crate::error::{QueueError, QueueResult};

/// Counting semaphore for one family, independent of queue depth.
#[derive(Debug, Clone)]
pub struct PermitPool {
    family: JobFamily,
    size: usize,
    semaphore: Arc<Semaphore>,
}

impl PermitPool {
    /// Create a pool of `size` permits (minimum 1).
    pub fn new(family: JobFamily, size: usize) -> Self {
        let size = size.max(1);
        Self {
            family,
            size,
            semaphore: Arc::new(Semaphore::new(size)),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Wait for a permit. Released when the returned guard drops.
    pub async fn acquire(&self) -> QueueResult<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| QueueError::Closed(self.family))
    }

    /// Permits currently held.
    pub fn in_use(&self) -> usize {
        self.size.saturating_sub(self.semaphore.available_permits())
    }

    /// Wake all waiters with an error. Held permits stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }
}
