use shared::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::warn;

/// Bounds caller-visible latency of a unit of work.
///
/// The work runs as a tracked task. If the budget elapses first the caller
/// gets `Error::Timeout`, while the task keeps running to completion so its
/// side effects (cache writes) still land.
#[derive(Clone, Debug)]
pub struct DeadlineGuard {
    tasks: TaskTracker,
    budget: Duration,
}

impl DeadlineGuard {
    pub fn new(tasks: TaskTracker, budget: Duration) -> Self {
        Self { tasks, budget }
    }

    pub async fn run<T, F>(&self, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let handle = self.tasks.spawn(work);

        match tokio::time::timeout(self.budget, handle).await {
            Ok(joined) => joined.map_err(|e| Error::Internal(format!("lookup task failed: {e}")))?,
            Err(_) => {
                warn!("Deadline of {:?} exceeded, detaching work", self.budget);
                Err(Error::Timeout(self.budget))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_work_finishing_in_time_wins() {
        let guard = DeadlineGuard::new(TaskTracker::new(), Duration::from_secs(10));

        let result = guard
            .run(async {
                tokio::time::sleep(Duration::from_secs(9)).await;
                Ok(42)
            })
            .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_from_work_pass_through() {
        let guard = DeadlineGuard::new(TaskTracker::new(), Duration::from_secs(10));

        let result: Result<()> = guard.run(async { Err(Error::NotFound) }).await;

        assert!(matches!(result, Err(Error::NotFound)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_detaches_but_does_not_cancel() {
        let tasks = TaskTracker::new();
        let guard = DeadlineGuard::new(tasks.clone(), Duration::from_secs(10));
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        let started = tokio::time::Instant::now();
        let result = guard
            .run(async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(Error::Timeout(d)) if d == Duration::from_secs(10)));
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert!(!finished.load(Ordering::SeqCst));

        tasks.close();
        tasks.wait().await;
        assert!(finished.load(Ordering::SeqCst));
    }
}
