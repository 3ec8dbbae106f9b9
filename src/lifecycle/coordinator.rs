//! Named barrier registry.

use crate::error::{Result, VaultError};
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::debug;

/// Barrier awaited before the application starts.
pub const START_BARRIER: &str = "start";

/// A spawned task any number of waiters can await.
type SharedTask<T> = Shared<BoxFuture<'static, Result<T>>>;

/// Registry of initialization tasks grouped by barrier.
///
/// Tasks stay registered after they finish, so every caller of
/// [`run_barrier`](Self::run_barrier) waits for the same set and sees the
/// same results.
pub struct LifecycleCoordinator<T = ()> {
    barriers: Mutex<HashMap<String, Vec<SharedTask<T>>>>,
}

impl<T> LifecycleCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            barriers: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn `task` and register it under `barrier`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register_task<F>(&self, task: F, barrier: &str)
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        self.register_handle(tokio::spawn(task), barrier);
    }

    /// Register an already spawned task under `barrier`.
    pub fn register_handle(&self, handle: JoinHandle<Result<T>>, barrier: &str) {
        let task = handle
            .map(|joined| joined.unwrap_or_else(|e| Err(VaultError::from(e))))
            .boxed()
            .shared();
        self.barriers
            .lock()
            .entry(barrier.to_string())
            .or_default()
            .push(task);
    }

    /// Number of tasks under `barrier` not yet seen to finish.
    pub fn pending(&self, barrier: &str) -> usize {
        self.barriers
            .lock()
            .get(barrier)
            .map_or(0, |tasks| tasks.iter().filter(|t| t.peek().is_none()).count())
    }

    /// Wait for every task registered under `barrier` so far.
    ///
    /// All tasks are awaited even if one fails; the first failure in
    /// registration order is returned. On success, returns each task's
    /// result in registration order.
    pub async fn run_barrier(&self, barrier: &str) -> Result<Vec<T>> {
        let tasks = {
            let barriers = self.barriers.lock();
            barriers.get(barrier).cloned().unwrap_or_default()
        };
        debug!(barrier, tasks = tasks.len(), "running barrier");

        join_all(tasks).await.into_iter().collect()
    }
}

impl<T> Default for LifecycleCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for LifecycleCoordinator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let barriers = self.barriers.lock();
        let mut map = f.debug_map();
        for (name, tasks) in barriers.iter() {
            map.entry(name, &tasks.len());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_barrier_waits_for_tasks() {
        let coordinator = LifecycleCoordinator::new();
        let done = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel::<()>();

        let counter = Arc::clone(&done);
        coordinator.register_task(
            async move {
                rx.await.ok();
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            START_BARRIER,
        );
        let counter = Arc::clone(&done);
        coordinator.register_task(
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            START_BARRIER,
        );
        assert_eq!(coordinator.pending(START_BARRIER), 2);

        tx.send(()).unwrap();
        assert_eq!(coordinator.run_barrier(START_BARRIER).await.unwrap().len(), 2);
        assert_eq!(done.load(Ordering::SeqCst), 2);
        assert_eq!(coordinator.pending(START_BARRIER), 0);
    }

    #[tokio::test]
    async fn test_empty_barrier_resolves() {
        let coordinator = LifecycleCoordinator::<()>::new();
        assert!(coordinator.run_barrier("nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_barriers_are_independent() {
        let coordinator = LifecycleCoordinator::new();
        coordinator.register_task(async { Ok(()) }, "a");
        coordinator.register_task(async { Ok(()) }, "b");

        assert_eq!(coordinator.run_barrier("a").await.unwrap().len(), 1);
        assert_eq!(coordinator.pending("b"), 1);
    }

    #[tokio::test]
    async fn test_results_in_registration_order() {
        let coordinator = LifecycleCoordinator::new();
        let (tx, rx) = oneshot::channel::<()>();
        coordinator.register_task(
            async move {
                rx.await.ok();
                Ok(1u32)
            },
            START_BARRIER,
        );
        coordinator.register_task(async { Ok(2u32) }, START_BARRIER);

        tx.send(()).unwrap();
        assert_eq!(coordinator.run_barrier(START_BARRIER).await.unwrap(), vec![1, 2]);
        // Finished tasks keep their results for later callers.
        assert_eq!(coordinator.run_barrier(START_BARRIER).await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_concurrent_waiters_all_block() {
        let coordinator = Arc::new(LifecycleCoordinator::new());
        let (tx, rx) = oneshot::channel::<()>();
        coordinator.register_task(
            async move {
                rx.await.ok();
                Ok(())
            },
            START_BARRIER,
        );

        let waiter = |c: Arc<LifecycleCoordinator>| {
            tokio::spawn(async move { c.run_barrier(START_BARRIER).await })
        };
        let first = waiter(Arc::clone(&coordinator));
        let second = waiter(Arc::clone(&coordinator));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!first.is_finished());
        assert!(!second.is_finished());

        tx.send(()).unwrap();
        assert_eq!(first.await.unwrap().unwrap().len(), 1);
        assert_eq!(second.await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_surfaces_after_all_finish() {
        let coordinator = LifecycleCoordinator::new();
        let done = Arc::new(AtomicUsize::new(0));

        coordinator.register_task(
            async { Err(VaultError::storage("k/", "unavailable")) },
            START_BARRIER,
        );
        let counter = Arc::clone(&done);
        coordinator.register_task(
            async move {
                tokio::task::yield_now().await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            START_BARRIER,
        );

        assert!(coordinator.run_barrier(START_BARRIER).await.is_err());
        assert_eq!(done.load(Ordering::SeqCst), 1);
        // Every caller sees the failure.
        assert!(matches!(
            coordinator.run_barrier(START_BARRIER).await,
            Err(VaultError::Storage { .. })
        ));
    }
}
