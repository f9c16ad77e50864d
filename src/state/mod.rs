// Run-level mutual exclusion
//
// A process holds one RunLock and passes it to every preprocessing pass, so
// repeated triggers queue up instead of mirroring into the same target at once.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Proof that a pass holds its [`RunLock`]
///
/// Clones are handed to every worker of the pass, so the lock stays taken
/// until the last of them is dropped, even by workers left running after the
/// pass stopped waiting for them.
pub type RunGuard = Arc<OwnedMutexGuard<()>>;

/// Guard that lets at most one full preprocessing pass run at a time
///
/// Cloning is cheap and every clone guards the same pass. Waiters are served
/// in the order they arrived and wait without a timeout. The lock is
/// released however the body ends: normal return, error, panic or the
/// waiting future being dropped.
///
/// The lock is not re-entrant; a body that calls [`with_lock`](Self::with_lock)
/// on the same lock again will wait forever.
#[derive(Debug, Clone, Default)]
pub struct RunLock {
    inner: Arc<Mutex<()>>,
}

impl RunLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lock and take it
    pub async fn acquire(&self) -> RunGuard {
        if self.is_busy() {
            tracing::info!("Another preprocessing pass is running, waiting for it to finish");
        }

        Arc::new(Arc::clone(&self.inner).lock_owned().await)
    }

    /// Run `body` while holding the lock
    pub async fn with_lock<F>(&self, body: F) -> F::Output
    where
        F: Future,
    {
        let _guard = self.acquire().await;
        body.await
    }

    /// Whether a pass currently holds the lock
    pub fn is_busy(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lock_is_free_initially() {
        let lock = RunLock::new();
        assert!(!lock.is_busy());
        assert_eq!(lock.with_lock(async { 7 }).await, 7);
        assert!(!lock.is_busy());
    }

    #[tokio::test]
    async fn test_busy_while_body_runs() {
        let lock = RunLock::new();
        let observer = lock.clone();

        let busy = lock.with_lock(async move { observer.is_busy() }).await;

        assert!(busy);
        assert!(!lock.is_busy());
    }

    #[tokio::test]
    async fn test_released_after_error() {
        let lock = RunLock::new();

        let result: Result<(), String> = lock.with_lock(async { Err("boom".to_string()) }).await;

        assert!(result.is_err());
        assert!(!lock.is_busy());
    }

    #[tokio::test]
    async fn test_released_when_cancelled() {
        let lock = RunLock::new();

        let timed_out = tokio::time::timeout(
            Duration::from_millis(20),
            lock.with_lock(tokio::time::sleep(Duration::from_secs(60))),
        )
        .await;

        assert!(timed_out.is_err());
        assert!(!lock.is_busy());
    }

    #[tokio::test]
    async fn test_held_until_last_guard_clone_drops() {
        let lock = RunLock::new();

        let guard = lock.acquire().await;
        let worker_copy = Arc::clone(&guard);
        drop(guard);
        assert!(lock.is_busy());

        drop(worker_copy);
        assert!(!lock.is_busy());
    }
}
