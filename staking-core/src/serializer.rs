//! Strict-order submission queue
//!
//! Several networks validate nonces server-side and reject transactions that
//! arrive out of order. [`RequestSerializer`] runs submitted tasks one at a
//! time, in the order [`RequestSerializer::enqueue`] was called:
//!
//! ```text
//! enqueue(a) ─┐
//! enqueue(b) ─┼─► mpsc (unbounded, FIFO) ─► worker: run a → settle → run b → settle → ...
//! enqueue(c) ─┘                                        │             │
//!                                                 oneshot(a)    oneshot(b)
//! ```
//!
//! The worker only waits for a task to *settle*; it never looks at whether
//! the task succeeded. The task's own result goes back to its caller through
//! a oneshot channel, so a failure is delivered to that caller and the queue
//! moves on to the next task.

use crate::{Error, Result};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// FIFO single-flight task queue.
///
/// Clones share the same queue. Must be created inside a Tokio runtime.
#[derive(Clone)]
pub struct RequestSerializer {
    name: Arc<str>,
    job_tx: mpsc::UnboundedSender<Job>,
    pending: Arc<AtomicUsize>,
}

impl RequestSerializer {
    /// Create a queue and spawn its worker
    pub fn new(name: impl Into<String>) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let (job_tx, job_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_worker(Arc::clone(&name), job_rx));

        Self {
            name,
            job_tx,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue a task behind every task enqueued before it.
    ///
    /// The position in the queue is fixed when this method is called, not
    /// when the returned future is first polled. `task` is invoked only once
    /// the previous task has settled.
    pub fn enqueue<F, Fut, T>(&self, task: F) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (response_tx, response_rx) = oneshot::channel();
        let pending = Arc::clone(&self.pending);
        let name = Arc::clone(&self.name);

        let job: Job = Box::pin(async move {
            // Spawned so a panicking task cannot take the worker down
            let outcome = match tokio::spawn(task()).await {
                Ok(outcome) => outcome,
                Err(e) => Err(Error::Concurrency(format!("queued task failed to complete: {e}"))),
            };

            if let Err(e) = &outcome {
                debug!("Queue {} task settled with error: {}", name, e);
            }

            pending.fetch_sub(1, Ordering::SeqCst);
            // Caller may have stopped waiting
            let _ = response_tx.send(outcome);
        });

        self.pending.fetch_add(1, Ordering::SeqCst);
        let submitted = self.job_tx.send(job).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            Error::Concurrency(format!("queue {} worker stopped", self.name))
        });

        async move {
            submitted?;
            response_rx
                .await
                .map_err(|e| Error::Concurrency(format!("queued task dropped: {e}")))?
        }
    }

    /// Tasks enqueued but not yet settled
    pub fn queue_depth(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Queue name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for RequestSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSerializer")
            .field("name", &self.name)
            .field("queue_depth", &self.queue_depth())
            .finish()
    }
}

async fn run_worker(name: Arc<str>, mut job_rx: mpsc::UnboundedReceiver<Job>) {
    debug!("Queue {} worker started", name);

    while let Some(job) = job_rx.recv().await {
        job.await;
    }

    warn!("Queue {} worker stopped", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn test_tasks_run_in_enqueue_order() {
        let queue = RequestSerializer::new("test");
        let log = Arc::new(Mutex::new(Vec::new()));

        // Later tasks finish faster; order must still hold
        let futures: Vec<_> = (0..5u64)
            .map(|i| {
                let log = Arc::clone(&log);
                queue.enqueue(move || async move {
                    log.lock().push(format!("start-{i}"));
                    tokio::time::sleep(Duration::from_millis(50 - i * 10)).await;
                    log.lock().push(format!("end-{i}"));
                    Ok(i)
                })
            })
            .collect();

        let results: Vec<u64> = futures::future::join_all(futures)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(results, vec![0, 1, 2, 3, 4]);
        let expected: Vec<String> = (0..5)
            .flat_map(|i| [format!("start-{i}"), format!("end-{i}")])
            .collect();
        assert_eq!(*log.lock(), expected);
    }

    #[tokio::test]
    async fn test_failure_reaches_caller_and_queue_continues() {
        let queue = RequestSerializer::new("test");

        let first = queue.enqueue(|| async { Ok::<_, Error>("first") });
        let second = queue.enqueue(|| async {
            Err::<&str, _>(Error::Transport("nonce too low".into()))
        });
        let third = queue.enqueue(|| async { Ok::<_, Error>("third") });

        assert_eq!(first.await.unwrap(), "first");
        let err = second.await.unwrap_err();
        assert!(matches!(err, Error::Transport(ref m) if m == "nonce too low"));
        assert_eq!(third.await.unwrap(), "third");
        assert_eq!(queue.queue_depth(), 0);
    }

    #[tokio::test]
    async fn test_panicking_task_is_isolated() {
        let queue = RequestSerializer::new("test");

        let bad = queue.enqueue(|| async {
            if true {
                panic!("broadcast client bug");
            }
            Ok::<u8, Error>(0)
        });
        let good = queue.enqueue(|| async { Ok::<u8, Error>(7) });

        assert!(matches!(bad.await, Err(Error::Concurrency(_))));
        assert_eq!(good.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_task_not_started_until_previous_settles() {
        let queue = RequestSerializer::new("test");
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let started = Arc::new(AtomicUsize::new(0));

        let blocker = queue.enqueue(move || async move {
            release_rx.await.ok();
            Ok::<_, Error>(())
        });
        let follower = {
            let started = Arc::clone(&started);
            queue.enqueue(move || async move {
                started.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(())
            })
        };

        let blocker = tokio::spawn(blocker);
        let follower = tokio::spawn(follower);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(started.load(Ordering::SeqCst), 0);
        assert_eq!(queue.queue_depth(), 2);

        release_tx.send(()).unwrap();
        blocker.await.unwrap().unwrap();
        follower.await.unwrap().unwrap();
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }
}
