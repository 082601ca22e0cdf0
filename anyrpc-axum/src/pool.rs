//! Bounded worker pool for blocking work.
//!
//! Decoding and handler execution may block, so they never run on the async
//! runtime's I/O threads. [`WorkerPool::run`] moves a closure onto tokio's
//! blocking thread pool, gated by a semaphore so that at most `max_workers`
//! closures execute at once. Callers beyond that wait for a permit; with a
//! `max_queued` bound, callers beyond *that* are turned away.
//!
//! The pool is the single point of backpressure: it never spawns more than
//! `max_workers` blocking tasks on its own behalf.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinError;

/// Errors returned by [`WorkerPool::run`].
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Too many callers are already waiting for a worker.
    #[error("worker pool saturated: {queued} requests already waiting")]
    Saturated { queued: usize },

    /// The pool has been shut down.
    #[error("worker pool is shut down")]
    ShutDown,

    /// The task panicked or was aborted.
    #[error("worker task failed: {0}")]
    Join(#[source] JoinError),
}

/// Worker pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of tasks executing at once.
    pub max_workers: usize,
    /// Maximum number of tasks waiting for a worker. `None` is unbounded.
    pub max_queued: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(4),
            max_queued: None,
        }
    }
}

/// A bounded pool of blocking workers.
#[derive(Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    max_workers: usize,
    max_queued: Option<usize>,
    queued: AtomicUsize,
}

impl WorkerPool {
    /// Create a pool. A `max_workers` of zero is raised to one.
    pub fn new(config: PoolConfig) -> Self {
        let max_workers = config.max_workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            max_queued: config.max_queued,
            queued: AtomicUsize::new(0),
        }
    }

    /// Run `task` on a worker thread and wait for its result.
    ///
    /// Waits for a free worker first. If this future is dropped while
    /// waiting, the task never starts; if dropped after the task started,
    /// the task runs to completion and its result is discarded.
    ///
    /// # Errors
    /// - [`PoolError::Saturated`] if `max_queued` callers are already waiting
    /// - [`PoolError::ShutDown`] if the pool was shut down
    /// - [`PoolError::Join`] if the task panicked
    pub async fn run<F, T>(&self, task: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = {
            let _slot = QueueSlot::enter(self)?;
            self.permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| PoolError::ShutDown)?
        };

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            task()
        });
        handle.await.map_err(PoolError::Join)
    }

    /// Stop accepting work. Tasks already running finish normally; waiting
    /// and future callers get [`PoolError::ShutDown`].
    pub fn shutdown(&self) {
        self.permits.close();
        tracing::info!(target: "anyrpc_axum", "worker pool shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.permits.is_closed()
    }

    /// Configured number of workers.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Workers not currently running a task.
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Callers currently waiting for a worker.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }
}

/// Counts a caller as waiting for as long as it holds the slot.
struct QueueSlot<'a> {
    queued: &'a AtomicUsize,
}

impl<'a> QueueSlot<'a> {
    fn enter(pool: &'a WorkerPool) -> Result<Self, PoolError> {
        if pool.permits.is_closed() {
            return Err(PoolError::ShutDown);
        }
        let waiting = pool.queued.fetch_add(1, Ordering::AcqRel);
        if let Some(max) = pool.max_queued {
            // A free worker means no real wait, so only count against the
            // bound when every worker is busy.
            if waiting >= max && pool.permits.available_permits() == 0 {
                pool.queued.fetch_sub(1, Ordering::AcqRel);
                return Err(PoolError::Saturated { queued: waiting });
            }
        }
        Ok(Self {
            queued: &pool.queued,
        })
    }
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.queued.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn pool(max_workers: usize, max_queued: Option<usize>) -> Arc<WorkerPool> {
        Arc::new(WorkerPool::new(PoolConfig {
            max_workers,
            max_queued,
        }))
    }

    #[tokio::test]
    async fn test_run_returns_result() {
        let pool = pool(2, None);
        let out = pool.run(|| 40 + 2).await.unwrap();
        assert_eq!(out, 42);
        assert_eq!(pool.idle_workers(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrency_is_bounded() {
        let pool = pool(2, None);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..16).map(|_| {
            let pool = pool.clone();
            let running = running.clone();
            let peak = peak.clone();
            async move {
                pool.run(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(10));
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }
        });

        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_saturated_pool_rejects() {
        let pool = pool(1, Some(0));
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();

        let busy = {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.run(move || {
                    let _ = started_tx.send(());
                    let _ = release_rx.recv();
                })
                .await
            })
        };
        started_rx.await.unwrap();

        let rejected = pool.run(|| ()).await;
        assert!(matches!(rejected, Err(PoolError::Saturated { .. })));

        release_tx.send(()).unwrap();
        busy.await.unwrap().unwrap();
        assert!(pool.run(|| ()).await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let pool = pool(2, None);
        pool.shutdown();

        assert!(pool.is_shut_down());
        assert!(matches!(pool.run(|| ()).await, Err(PoolError::ShutDown)));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let pool = pool(1, None);
        let result = pool.run(|| panic!("handler blew up")).await;

        match result {
            Err(PoolError::Join(err)) => assert!(err.is_panic()),
            other => panic!("expected join error, got {other:?}"),
        }
        // The permit was released by the unwinding task.
        assert_eq!(pool.run(|| 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_queue_slot_released_on_cancel() {
        let pool = pool(1, None);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let busy = {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.run(move || {
                    let _ = started_tx.send(());
                    release_rx.recv().ok()
                })
                .await
            })
        };
        started_rx.await.unwrap();

        let waiting = tokio::time::timeout(Duration::from_millis(20), pool.run(|| ())).await;
        assert!(waiting.is_err());
        assert_eq!(pool.queued(), 0);

        release_tx.send(()).unwrap();
        busy.await.unwrap().unwrap();
    }
}
