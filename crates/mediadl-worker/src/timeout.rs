//! Deadline enforcement for external invocations.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

/// Why an invocation was interrupted before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// The job record was deleted
    Deleted,
    /// The engine is shutting down
    Shutdown,
}

/// Result of a guarded invocation.
#[derive(Debug)]
pub enum GuardOutcome<T> {
    /// The invocation returned first
    Completed(T),
    /// The deadline fired first
    TimedOut(Duration),
    /// A delete or shutdown signal fired first
    Interrupted(Interrupt),
}

/// Races an invocation against a fixed deadline and the interrupt signals.
///
/// When anything other than the invocation wins, `cancel` is set so the
/// capability can stop cooperatively, and the invocation future is dropped,
/// which kills any subprocess spawned with `kill_on_drop`.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    deadline: Duration,
}

impl TimeoutGuard {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub async fn run<F, T>(
        &self,
        invocation: F,
        cancel: &watch::Sender<bool>,
        deleted: &mut watch::Receiver<bool>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> GuardOutcome<T>
    where
        F: Future<Output = T>,
    {
        tokio::pin!(invocation);

        let outcome = tokio::select! {
            biased;
            result = &mut invocation => return GuardOutcome::Completed(result),
            _ = tokio::time::sleep(self.deadline) => GuardOutcome::TimedOut(self.deadline),
            _ = signalled(deleted) => GuardOutcome::Interrupted(Interrupt::Deleted),
            _ = signalled(shutdown) => GuardOutcome::Interrupted(Interrupt::Shutdown),
        };

        let _ = cancel.send(true);
        outcome
    }
}

/// Resolves once the flag is `true`. Pending forever if the sender is gone.
pub(crate) async fn signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
