//! Bounded background work queue.
//!
//! `BackgroundQueue` runs fire-and-forget units (context preparation,
//! intervention writes) on a fixed pool of tokio workers fed by a bounded
//! `mpsc` channel. Submission never waits: a full or closed queue rejects
//! the unit immediately. Shutdown either drains outstanding work for a
//! bounded time or cancels it.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use tether_types::config::QueueConfig;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Why a unit was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("background queue is full")]
    Full,
    #[error("background queue is shut down")]
    Closed,
}

/// How to stop the queue.
#[derive(Debug, Clone, Copy)]
pub enum Shutdown {
    /// Stop accepting work, let queued units finish for up to the given time,
    /// then cancel whatever is left.
    Drain(Duration),
    /// Cancel in-flight units and discard queued ones.
    Cancel,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
    panicked: AtomicU64,
}

/// Point-in-time queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Units accepted by `submit`.
    pub submitted: u64,
    /// Units that ran to completion (including ones that panicked).
    pub completed: u64,
    /// Units refused because the queue was full or closed.
    pub rejected: u64,
    pub panicked: u64,
}

/// Result of a shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// True if every accepted unit finished before the deadline.
    pub drained: bool,
    /// Accepted units that never finished.
    pub abandoned: u64,
}

pub struct BackgroundQueue {
    name: String,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    counters: Arc<Counters>,
}

impl BackgroundQueue {
    /// Start the worker pool. Must be called inside a tokio runtime.
    pub fn new(name: impl Into<String>, config: &QueueConfig) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::channel::<Job>(config.capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let cancel = CancellationToken::new();
        let counters = Arc::new(Counters::default());

        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    name.clone(),
                    worker_id,
                    rx.clone(),
                    cancel.clone(),
                    counters.clone(),
                ))
            })
            .collect();

        Self {
            name,
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            cancel,
            counters,
        }
    }

    /// Enqueue a unit without waiting.
    pub fn submit<F>(&self, job: F) -> Result<(), SubmitError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = self.sender.lock().expect("queue sender lock poisoned").clone();
        let result = match sender {
            Some(tx) => tx.try_send(Box::pin(job)).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SubmitError::Full,
                mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
            }),
            None => Err(SubmitError::Closed),
        };

        match result {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(queue = %self.name, error = %e, "background unit rejected");
            }
        }
        result
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().expect("queue sender lock poisoned").is_none()
    }

    /// Stop the queue. Idempotent; later calls return immediately.
    #[tracing::instrument(name = "queue.shutdown", skip(self), fields(queue = %self.name))]
    pub async fn shutdown(&self, mode: Shutdown) -> ShutdownReport {
        // Dropping the last sender lets idle workers observe end-of-stream.
        drop(self.sender.lock().expect("queue sender lock poisoned").take());
        let mut handles =
            std::mem::take(&mut *self.workers.lock().expect("queue workers lock poisoned"));

        let drained = match mode {
            Shutdown::Drain(deadline) => {
                // Joined handles are popped so none is polled after completion.
                let joined = tokio::time::timeout(deadline, async {
                    while let Some(handle) = handles.last_mut() {
                        let _ = handle.await;
                        handles.pop();
                    }
                })
                .await;
                joined.is_ok()
            }
            Shutdown::Cancel => false,
        };

        if !drained {
            self.cancel.cancel();
            for handle in handles {
                let _ = handle.await;
            }
        }

        let stats = self.stats();
        let abandoned = stats.submitted.saturating_sub(stats.completed);
        if abandoned > 0 {
            tracing::warn!(abandoned, "background units abandoned at shutdown");
        }
        ShutdownReport {
            drained: abandoned == 0,
            abandoned,
        }
    }
}

impl Drop for BackgroundQueue {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn worker_loop(
    queue: String,
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    cancel: CancellationToken,
    counters: Arc<Counters>,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = async { rx.lock().await.recv().await } => match job {
                Some(job) => job,
                None => break,
            },
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(queue = %queue, worker_id, "in-flight unit cancelled");
                break;
            }
            outcome = AssertUnwindSafe(job).catch_unwind() => {
                if outcome.is_err() {
                    counters.panicked.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(queue = %queue, worker_id, "background unit panicked");
                }
                counters.completed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    tracing::trace!(queue = %queue, worker_id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    fn config(capacity: usize, workers: usize) -> QueueConfig {
        QueueConfig { capacity, workers }
    }

    #[tokio::test]
    async fn test_submitted_units_run() {
        let queue = BackgroundQueue::new("test", &config(8, 2));
        let (tx, rx) = oneshot::channel();
        queue
            .submit(async move {
                let _ = tx.send(42);
            })
            .unwrap();
        assert_eq!(rx.await.unwrap(), 42);

        let report = queue.shutdown(Shutdown::Drain(Duration::from_secs(1))).await;
        assert!(report.drained);
        assert_eq!(queue.stats().completed, 1);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_immediately() {
        let queue = BackgroundQueue::new("test", &config(1, 1));
        let (started_tx, started_rx) = oneshot::channel();
        let (gate_tx, gate_rx) = oneshot::channel::<()>();

        queue
            .submit(async move {
                let _ = started_tx.send(());
                let _ = gate_rx.await;
            })
            .unwrap();
        started_rx.await.unwrap();

        // worker busy, one slot left in the channel
        queue.submit(async {}).unwrap();
        assert_eq!(queue.submit(async {}), Err(SubmitError::Full));
        assert_eq!(queue.stats().rejected, 1);

        let _ = gate_tx.send(());
        let report = queue.shutdown(Shutdown::Drain(Duration::from_secs(1))).await;
        assert!(report.drained);
        assert_eq!(queue.stats().completed, 2);
    }

    #[tokio::test]
    async fn test_drain_finishes_queued_units() {
        let queue = BackgroundQueue::new("test", &config(16, 1));
        let done = Arc::new(AtomicU64::new(0));
        for _ in 0..5 {
            let done = done.clone();
            queue
                .submit(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        let report = queue.shutdown(Shutdown::Drain(Duration::from_secs(2))).await;
        assert!(report.drained);
        assert_eq!(done.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_deadline_cancels_stuck_units() {
        let queue = BackgroundQueue::new("test", &config(4, 1));
        queue
            .submit(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            })
            .unwrap();
        tokio::task::yield_now().await;

        let report = queue.shutdown(Shutdown::Drain(Duration::from_millis(100))).await;
        assert!(!report.drained);
        assert_eq!(report.abandoned, 1);
    }

    #[tokio::test]
    async fn test_cancel_discards_pending_units() {
        let queue = BackgroundQueue::new("test", &config(4, 1));
        let (gate_tx, gate_rx) = oneshot::channel::<()>();
        queue
            .submit(async move {
                let _ = gate_rx.await;
            })
            .unwrap();
        queue.submit(async {}).unwrap();

        let report = queue.shutdown(Shutdown::Cancel).await;
        assert!(!report.drained);
        assert!(report.abandoned >= 1);
        drop(gate_tx);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_closed() {
        let queue = BackgroundQueue::new("test", &config(4, 1));
        queue.shutdown(Shutdown::Cancel).await;
        assert!(queue.is_closed());
        assert_eq!(queue.submit(async {}), Err(SubmitError::Closed));
    }

    #[tokio::test]
    async fn test_panicking_unit_does_not_kill_worker() {
        let queue = BackgroundQueue::new("test", &config(4, 1));
        queue
            .submit(async {
                if true {
                    panic!("boom");
                }
            })
            .unwrap();
        let (tx, rx) = oneshot::channel();
        queue
            .submit(async move {
                let _ = tx.send(());
            })
            .unwrap();
        rx.await.unwrap();

        queue.shutdown(Shutdown::Drain(Duration::from_secs(1))).await;
        assert_eq!(queue.stats().panicked, 1);
    }
}
