//! Scoped background task handle
//!
//! Wraps a spawned tokio task so that it is aborted on `cancel()` or when the
//! handle is dropped. Cancelling never waits for the task to finish and is
//! safe to repeat.

use std::future::Future;
use tokio::task::AbortHandle;

#[derive(Debug)]
pub struct ScopedTask {
    abort: Option<AbortHandle>,
}

impl ScopedTask {
    /// Spawn `future` on the current runtime
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        Self { abort: Some(handle.abort_handle()) }
    }

    /// Abort the task. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(abort) = self.abort.take() {
            abort.abort();
        }
    }

    /// True until cancelled or the task has run to completion
    pub fn is_active(&self) -> bool {
        self.abort.as_ref().is_some_and(|a| !a.is_finished())
    }
}

impl Drop for ScopedTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let mut task = ScopedTask::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        assert!(task.is_active());

        task.cancel();
        task.cancel();
        assert!(!task.is_active());
    }

    #[tokio::test]
    async fn test_drop_aborts() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let task = ScopedTask::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        });
        drop(task);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }
}
