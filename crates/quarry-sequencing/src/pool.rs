//! Worker pool that runs sequencing work on tokio tasks.

use crate::error::SequencingError;
use parking_lot::Mutex;
use quarry_config::SequencingConfig;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// A unit of work accepted by the pool.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Returned when work is submitted to a pool that is shutting down.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Worker pool is shut down")]
pub struct PoolClosed;

/// Sizing of a [`WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker tasks
    pub workers: usize,
    /// Queue bound; submission waits when full. Unbounded when `None`.
    pub queue_capacity: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_capacity: None,
        }
    }
}

impl PoolConfig {
    /// Set the number of workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Bound the queue.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }
}

impl From<&SequencingConfig> for PoolConfig {
    fn from(config: &SequencingConfig) -> Self {
        Self {
            workers: config.workers,
            queue_capacity: config.queue_capacity,
        }
    }
}

/// Fixed set of tokio workers consuming jobs from a shared queue.
///
/// Each job runs as its own task, so a panicking job is reported and the
/// worker moves on. [`WorkerPool::shutdown`] closes the queue; jobs already
/// queued still run, after which the workers exit and the pool reports
/// termination.
pub struct WorkerPool {
    sender: Mutex<Option<flume::Sender<Job>>>,
    workers: usize,
    terminated: watch::Receiver<bool>,
}

impl WorkerPool {
    /// Spawn the workers on the current tokio runtime.
    pub fn new(config: PoolConfig) -> Result<Self, SequencingError> {
        if config.workers == 0 {
            return Err(SequencingError::Pool(
                "worker pool needs at least one worker".to_string(),
            ));
        }
        if config.queue_capacity == Some(0) {
            return Err(SequencingError::Pool(
                "queue capacity must be greater than zero".to_string(),
            ));
        }

        let handle = Handle::try_current().map_err(|e| {
            SequencingError::Pool(format!("worker pool must be created inside a tokio runtime: {}", e))
        })?;

        let (sender, receiver) = match config.queue_capacity {
            Some(capacity) => flume::bounded(capacity),
            None => flume::unbounded(),
        };
        let (done_tx, done_rx) = watch::channel(false);
        let done_tx = Arc::new(done_tx);
        let live = Arc::new(AtomicUsize::new(config.workers));

        for id in 0..config.workers {
            handle.spawn(run_worker(
                id,
                receiver.clone(),
                Arc::clone(&live),
                Arc::clone(&done_tx),
            ));
        }

        info!(
            "Started worker pool with {} workers (queue: {})",
            config.workers,
            config
                .queue_capacity
                .map_or_else(|| "unbounded".to_string(), |c| c.to_string())
        );

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: config.workers,
            terminated: done_rx,
        })
    }

    /// Queue a job, waiting for room if the queue is bounded and full.
    pub async fn submit(&self, job: Job) -> Result<(), PoolClosed> {
        let sender = self.sender.lock().clone().ok_or(PoolClosed)?;
        sender.send_async(job).await.map_err(|_| PoolClosed)
    }

    /// Stop accepting jobs. Queued jobs still run.
    pub fn shutdown(&self) {
        if self.sender.lock().take().is_some() {
            info!("Worker pool shutting down");
        }
    }

    /// Whether [`WorkerPool::shutdown`] has been called.
    pub fn is_shutdown(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Whether every worker has exited.
    pub fn is_terminated(&self) -> bool {
        *self.terminated.borrow()
    }

    /// Wait until every worker has exited or `timeout` elapses.
    ///
    /// Returns whether the pool terminated.
    pub async fn await_termination(&self, timeout: Duration) -> bool {
        let mut terminated = self.terminated.clone();
        let drained = match tokio::time::timeout(timeout, terminated.wait_for(|done| *done)).await {
            Ok(Ok(_)) => true,
            Ok(Err(_)) => self.is_terminated(),
            Err(_) => false,
        };
        drained
    }

    /// Number of workers.
    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("shutdown", &self.is_shutdown())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

async fn run_worker(
    id: usize,
    jobs: flume::Receiver<Job>,
    live: Arc<AtomicUsize>,
    done: Arc<watch::Sender<bool>>,
) {
    debug!("Worker {} started", id);

    while let Ok(job) = jobs.recv_async().await {
        if let Err(e) = tokio::spawn(job).await {
            if e.is_panic() {
                error!("Sequencing task panicked on worker {}: {}", id, e);
            } else {
                warn!("Sequencing task cancelled on worker {}: {}", id, e);
            }
        }
    }

    debug!("Worker {} stopped", id);
    if live.fetch_sub(1, Ordering::AcqRel) == 1 {
        done.send_replace(true);
        info!("Worker pool terminated");
    }
}
