//! Tracking of in-flight write-back tasks.

use crate::error::{Result, VaultError};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

/// Write tasks that have been started but not yet awaited by anyone.
#[derive(Debug, Default)]
pub struct PendingWrites {
    tasks: Mutex<Vec<JoinHandle<Result<()>>>>,

    /// Failures of tasks reaped before anyone flushed.
    failures: Mutex<Vec<VaultError>>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a spawned write.
    ///
    /// Tasks that already finished are reaped here; their failures are kept
    /// for the next [`flush`](Self::flush).
    pub fn track(&self, task: JoinHandle<Result<()>>) {
        let mut tasks = self.tasks.lock();
        let mut reaped = Vec::new();
        tasks.retain_mut(|t| {
            if !t.is_finished() {
                return true;
            }
            match t.now_or_never() {
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => reaped.push(e),
                Some(Err(e)) => reaped.push(VaultError::from(e)),
                None => return true,
            }
            false
        });
        tasks.push(task);
        drop(tasks);

        if !reaped.is_empty() {
            self.failures.lock().extend(reaped);
        }
    }

    /// Number of writes not yet reaped.
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Await every outstanding write.
    ///
    /// Returns the number of writes awaited, or the first failure once all
    /// of them have completed.
    pub async fn flush(&self) -> Result<usize> {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        let mut failures = std::mem::take(&mut *self.failures.lock());
        let count = tasks.len();

        for task in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => failures.push(e),
                Err(e) => failures.push(VaultError::from(e)),
            }
        }

        let mut failures = failures.into_iter();
        match failures.next() {
            None => Ok(count),
            Some(first) => {
                for other in failures {
                    warn!(error = %other, "additional write-back failure");
                }
                Err(first)
            }
        }
    }
}
