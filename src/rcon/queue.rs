use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Errors returned by [`CommandQueue::run`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Command queue closed")]
    Closed,
}

/// FIFO task queue with a concurrency of one.
///
/// Every RCON exchange goes through here so at most one request is in flight
/// on the session. Each task gets `task_timeout` from the moment it starts;
/// a task that overruns is dropped and the queue moves on.
#[derive(Clone)]
pub struct CommandQueue {
    tx: mpsc::UnboundedSender<Job>,
    task_timeout: Duration,
}

impl CommandQueue {
    /// Spawn the worker. Must be called inside a tokio runtime.
    pub fn new(task_timeout: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
            }
            tracing::debug!("Command queue worker stopped");
        });

        Self { tx, task_timeout }
    }

    pub fn task_timeout(&self) -> Duration {
        self.task_timeout
    }

    /// Enqueue `task` and wait for its result.
    pub async fn run<F, T>(&self, task: F) -> Result<T, QueueError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let limit = self.task_timeout;

        let job: Job = Box::pin(async move {
            let outcome = timeout(limit, task).await;
            // Caller may have gone away; the result is simply discarded
            let _ = result_tx.send(outcome);
        });

        self.tx.send(job).map_err(|_| QueueError::Closed)?;

        match result_rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(QueueError::Timeout(limit)),
            Err(_) => Err(QueueError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    #[tokio::test]
    async fn test_runs_in_fifo_order() {
        let queue = CommandQueue::new(Duration::from_millis(500));
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let queue = queue.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                queue
                    .run(async move {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        order.lock().await.push(i);
                    })
                    .await
            }));
            // Give each push time to land before the next
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(*order.lock().await, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_single_task_in_flight() {
        let queue = CommandQueue::new(Duration::from_millis(500));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                queue
                    .run(async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_abandons_task_and_continues() {
        let queue = CommandQueue::new(Duration::from_millis(50));

        let slow = queue
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                1
            })
            .await;
        assert_eq!(slow, Err(QueueError::Timeout(Duration::from_millis(50))));

        let fast = queue.run(async { 2 }).await;
        assert_eq!(fast, Ok(2));
    }
}
