use crate::errors::{ErrorKind, PipelineError, Result};
use crate::processor::ProcessingOutcome;
use crate::queue::{Job, JobQueue};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

pub const DEFAULT_WORKERS: usize = 2;

/// Processes one job start to finish and reports how it went.
///
/// Handlers never fail: every error is folded into the returned outcome.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: Job) -> ProcessingOutcome;
}

/// Abstracts the worker pool so tests can swap concurrency strategies.
#[async_trait]
pub trait WorkerPool: Send + Sync {
    /// Drains `queue` through `handler` and returns every outcome in completion order.
    ///
    /// `on_complete` is invoked once per outcome, from the calling task.
    async fn run(
        &self,
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        on_complete: &(dyn for<'o> Fn(&'o ProcessingOutcome) + Send + Sync),
    ) -> Result<Vec<ProcessingOutcome>>;

    fn worker_count(&self) -> usize;

    async fn is_running(&self) -> bool;

    /// Cancelling stops workers from taking new jobs; jobs in flight still finish.
    fn cancellation_token(&self) -> CancellationToken;
}

/// A fixed number of tokio tasks pulling from one shared queue.
pub struct FixedWorkerPool {
    pool_id: String,
    max_workers: usize,
    is_running: Arc<RwLock<bool>>,
    cancellation_token: CancellationToken,
}

impl FixedWorkerPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            pool_id: uuid::Uuid::new_v4().to_string(),
            max_workers: max_workers.max(1),
            is_running: Arc::new(RwLock::new(false)),
            cancellation_token: CancellationToken::new(),
        }
    }

    async fn worker_loop(
        worker_id: usize,
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        outcomes: mpsc::UnboundedSender<ProcessingOutcome>,
        cancellation_token: CancellationToken,
    ) {
        loop {
            if cancellation_token.is_cancelled() {
                debug!(worker_id, "cancelled, not taking new jobs");
                break;
            }

            let job = match queue.dequeue().await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(e) => {
                    error!("Worker {} failed to dequeue: {}", worker_id, e);
                    break;
                }
            };

            debug!(worker_id, file = %job.file_name, "picked up job");
            let outcome = Self::handle_isolated(Arc::clone(&handler), job).await;

            if outcomes.send(outcome).is_err() {
                break;
            }
        }
        debug!(worker_id, "worker finished");
    }

    /// Runs the handler on its own task so a panic only fails that job.
    async fn handle_isolated(handler: Arc<dyn JobHandler>, job: Job) -> ProcessingOutcome {
        let start = Instant::now();
        let fallback = job.clone();
        match tokio::spawn(async move { handler.handle(job).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Error processing image {}: handler aborted: {}", fallback.file_name, e);
                ProcessingOutcome::failure(&fallback, ErrorKind::InputRead, start.elapsed())
            }
        }
    }
}

impl Default for FixedWorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

#[async_trait]
impl WorkerPool for FixedWorkerPool {
    async fn run(
        &self,
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        on_complete: &(dyn for<'o> Fn(&'o ProcessingOutcome) + Send + Sync),
    ) -> Result<Vec<ProcessingOutcome>> {
        {
            let mut running = self.is_running.write();
            if *running {
                return Err(PipelineError::WorkerPool {
                    pool_id: self.pool_id.clone(),
                    operation: "run".to_string(),
                    source: Box::new(std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "Worker pool is already running",
                    )),
                });
            }
            *running = true;
        }

        let tracker = TaskTracker::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        for worker_id in 0..self.max_workers {
            tracker.spawn(Self::worker_loop(
                worker_id,
                Arc::clone(&queue),
                Arc::clone(&handler),
                tx.clone(),
                self.cancellation_token.clone(),
            ));
        }
        drop(tx);
        tracker.close();

        let mut outcomes = Vec::new();
        while let Some(outcome) = rx.recv().await {
            on_complete(&outcome);
            outcomes.push(outcome);
        }
        tracker.wait().await;

        *self.is_running.write() = false;
        Ok(outcomes)
    }

    fn worker_count(&self) -> usize {
        self.max_workers
    }

    async fn is_running(&self) -> bool {
        *self.is_running.read()
    }

    fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}
