//! Abort coordination for long-running agent work
//!
//! One handle is shared across a turn (or a maintenance job); aborting it
//! terminates every sub-agent process hanging off that work and unblocks
//! their callers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Default)]
struct AbortInner {
    aborted: AtomicBool,
    notify: Notify,
}

/// Cloneable abort signal
#[derive(Clone, Default)]
pub struct AbortHandle {
    inner: Arc<AbortInner>,
}

impl AbortHandle {
    pub fn new() -> AbortHandle {
        AbortHandle::default()
    }

    /// Request abort; idempotent.
    pub fn abort(&self) {
        if !self.inner.aborted.swap(true, Ordering::SeqCst) {
            tracing::info!("Abort requested");
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Wait until abort is requested.
    pub async fn aborted(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortHandle")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_abort_unblocks_waiters() {
        let handle = AbortHandle::new();
        let waiter = handle.clone();
        let task = tokio::spawn(async move {
            waiter.aborted().await;
            true
        });
        handle.abort();
        assert!(task.await.unwrap());
        assert!(handle.is_aborted());
    }

    #[tokio::test]
    async fn test_wait_after_abort_returns_immediately() {
        let handle = AbortHandle::new();
        handle.abort();
        handle.aborted().await;
    }
}
