//! In-process run queue
//!
//! A single worker task pops jobs in FIFO order and awaits each one to
//! completion before starting the next, so at most one compute call is in
//! flight from this process. Enqueueing a run id that is already queued or
//! running is a no-op.
//!
//! Queued jobs live only in memory and are lost on restart.

use async_trait::async_trait;
use dashmap::DashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default deadline for one compute call
pub const DEFAULT_COMPUTE_TIMEOUT: Duration = Duration::from_secs(120);

/// Execution context handed to every job
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Deadline for the job's compute call
    pub compute_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl JobContext {
    pub fn new(compute_timeout: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            compute_timeout,
            shutdown,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once shutdown has been requested
    pub async fn cancelled(&self) {
        let mut shutdown = self.shutdown.clone();
        // A dropped sender means nobody can request shutdown any more
        while !*shutdown.borrow_and_update() {
            if shutdown.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// A unit of work executed by the queue worker
#[async_trait]
pub trait RunJob: Send + Sync {
    async fn execute(&self, ctx: &JobContext) -> anyhow::Result<()>;
}

/// Queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub compute_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            compute_timeout: DEFAULT_COMPUTE_TIMEOUT,
        }
    }
}

struct QueuedJob {
    run_id: String,
    job: Arc<dyn RunJob>,
}

struct QueueInner {
    /// Run ids currently queued or running
    tracked: DashSet<String>,
    sender: mpsc::UnboundedSender<QueuedJob>,
}

/// Handle to the process-wide run queue
///
/// Cloning shares the same queue and worker.
#[derive(Clone)]
pub struct RunQueue {
    inner: Arc<QueueInner>,
}

impl RunQueue {
    /// Create the queue and spawn its worker
    ///
    /// The worker exits once `shutdown` flips to `true`; jobs still queued at
    /// that point are dropped.
    pub fn spawn(config: QueueConfig, shutdown: watch::Receiver<bool>) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let inner = Arc::new(QueueInner {
            tracked: DashSet::new(),
            sender,
        });
        let ctx = JobContext::new(config.compute_timeout, shutdown);
        let handle = tokio::spawn(drain(Arc::clone(&inner), receiver, ctx));
        (Self { inner }, handle)
    }

    /// Enqueue a job for `run_id`
    ///
    /// Returns `false` without scheduling anything if the id is already
    /// queued or running.
    pub fn enqueue(&self, run_id: impl Into<String>, job: Arc<dyn RunJob>) -> bool {
        let run_id = run_id.into();
        if !self.inner.tracked.insert(run_id.clone()) {
            debug!(run_id = %run_id, "Run already queued, skipping");
            return false;
        }

        if self
            .inner
            .sender
            .send(QueuedJob {
                run_id: run_id.clone(),
                job,
            })
            .is_err()
        {
            warn!(run_id = %run_id, "Run queue worker has stopped, job dropped");
            self.inner.tracked.remove(&run_id);
            return false;
        }

        debug!(run_id = %run_id, pending = self.inner.tracked.len(), "Run enqueued");
        true
    }

    /// Number of jobs queued or running
    pub fn pending(&self) -> usize {
        self.inner.tracked.len()
    }

    pub fn is_tracked(&self, run_id: &str) -> bool {
        self.inner.tracked.contains(run_id)
    }
}

async fn drain(
    inner: Arc<QueueInner>,
    mut receiver: mpsc::UnboundedReceiver<QueuedJob>,
    ctx: JobContext,
) {
    info!(
        compute_timeout_secs = ctx.compute_timeout.as_secs(),
        "Starting run queue worker"
    );

    loop {
        let next = tokio::select! {
            job = receiver.recv() => job,
            _ = ctx.cancelled() => None,
        };
        let Some(QueuedJob { run_id, job }) = next else {
            break;
        };

        debug!(run_id = %run_id, "Executing run job");
        let job_ctx = ctx.clone();
        // Spawned so a panicking job cannot take the worker down with it
        let outcome = tokio::spawn(async move { job.execute(&job_ctx).await }).await;
        match outcome {
            Ok(Ok(())) => debug!(run_id = %run_id, "Run job finished"),
            Ok(Err(e)) => warn!(run_id = %run_id, error = %e, "Run job failed"),
            Err(e) => error!(run_id = %run_id, error = %e, "Run job panicked"),
        }
        inner.tracked.remove(&run_id);
    }

    info!(dropped = inner.tracked.len(), "Run queue worker stopped");
}
