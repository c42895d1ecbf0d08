use crate::{
    BatchResults, CaptureOrchestrator, CaptureOutcome, EndpointTask, ErrorKind, ResultAggregator,
};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub struct CaptureWorker {
    id: usize,
    orchestrator: Arc<CaptureOrchestrator>,
    is_running: Arc<AtomicBool>,
    processed_count: Arc<AtomicUsize>,
    error_count: Arc<AtomicUsize>,
}

impl CaptureWorker {
    pub fn new(id: usize, orchestrator: Arc<CaptureOrchestrator>) -> Self {
        Self {
            id,
            orchestrator,
            is_running: Arc::new(AtomicBool::new(false)),
            processed_count: Arc::new(AtomicUsize::new(0)),
            error_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Pull tasks until the queue is closed and drained, emitting one outcome each.
    pub async fn run_with_shared_receiver(
        &self,
        tasks: Arc<Mutex<mpsc::Receiver<EndpointTask>>>,
        results: mpsc::Sender<CaptureOutcome>,
    ) {
        debug!("Starting capture worker {}", self.id);
        self.is_running.store(true, Ordering::Relaxed);

        loop {
            // Release the queue before capturing so other workers can pull.
            let task = {
                let mut receiver = tasks.lock().await;
                receiver.recv().await
            };

            let Some(task) = task else { break };
            let outcome = self.process_task(&task).await;

            if outcome.success {
                self.processed_count.fetch_add(1, Ordering::Relaxed);
            } else {
                self.error_count.fetch_add(1, Ordering::Relaxed);
            }

            if let Err(e) = results.send(outcome).await {
                error!("Worker {} failed to send result: {}", self.id, e);
                break;
            }
        }

        self.is_running.store(false, Ordering::Relaxed);
        debug!("Capture worker {} stopped", self.id);
    }

    async fn process_task(&self, task: &EndpointTask) -> CaptureOutcome {
        debug!("Worker {} processing {}", self.id, task.url);

        match AssertUnwindSafe(self.orchestrator.capture(task))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("Worker {} panicked on {}: {}", self.id, task.url, message);
                CaptureOutcome::failed(
                    &task.url,
                    ErrorKind::Error,
                    format!("capture aborted: {message}"),
                    0,
                )
            }
        }
    }

    pub fn get_stats(&self) -> WorkerStats {
        WorkerStats {
            id: self.id,
            is_running: self.is_running.load(Ordering::Relaxed),
            processed_count: self.processed_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
        }
    }
}

impl Clone for CaptureWorker {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            orchestrator: self.orchestrator.clone(),
            is_running: self.is_running.clone(),
            processed_count: self.processed_count.clone(),
            error_count: self.error_count.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub id: usize,
    pub is_running: bool,
    pub processed_count: usize,
    pub error_count: usize,
}

/// Fixed-size pool draining one shared task queue.
pub struct WorkerPool {
    orchestrator: Arc<CaptureOrchestrator>,
    pool_size: usize,
    last_run: std::sync::Mutex<Vec<CaptureWorker>>,
}

impl WorkerPool {
    pub fn new(orchestrator: Arc<CaptureOrchestrator>, pool_size: usize) -> Self {
        Self {
            orchestrator,
            pool_size,
            last_run: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Number of workers a batch of `task_count` tasks gets.
    pub fn worker_count(&self, task_count: usize) -> usize {
        self.pool_size.min(task_count)
    }

    /// Process every task exactly once and aggregate the outcomes.
    ///
    /// Returns once all workers have exited and the results channel is
    /// drained. An empty task list or a pool size of 0 yields empty results.
    pub async fn run(&self, tasks: Vec<EndpointTask>, aggregator: &ResultAggregator) -> BatchResults {
        let total = tasks.len();
        let worker_count = self.worker_count(total);
        if worker_count == 0 {
            info!(tasks = total, pool_size = self.pool_size, "Nothing to dispatch");
            self.set_last_run(Vec::new());
            return BatchResults::default();
        }

        info!("Processing batch of {} endpoints with {} workers", total, worker_count);

        // Both queues hold the full batch, so neither side ever waits on capacity.
        let (task_sender, task_receiver) = mpsc::channel(total);
        let (result_sender, result_receiver) = mpsc::channel(total);

        for task in tasks {
            if let Err(e) = task_sender.send(task).await {
                error!("Failed to enqueue task: {}", e);
            }
        }
        drop(task_sender);

        let shared_receiver = Arc::new(Mutex::new(task_receiver));
        let workers: Vec<CaptureWorker> = (0..worker_count)
            .map(|id| CaptureWorker::new(id, self.orchestrator.clone()))
            .collect();

        let mut join_set = JoinSet::new();
        for worker in &workers {
            let worker = worker.clone();
            let rx = shared_receiver.clone();
            let tx = result_sender.clone();
            join_set.spawn(async move {
                worker.run_with_shared_receiver(rx, tx).await;
            });
        }
        // Only worker-held senders remain; the channel closes when they all exit.
        drop(result_sender);

        let drain_workers = async {
            while let Some(joined) = join_set.join_next().await {
                if let Err(e) = joined {
                    warn!("Capture worker task ended abnormally: {}", e);
                }
            }
        };
        let (batch, ()) = tokio::join!(aggregator.consume(result_receiver, total), drain_workers);

        info!(
            "Batch processing completed. Succeeded: {}, Failed: {}",
            batch.counters.succeeded,
            batch.counters.failed()
        );

        self.set_last_run(workers);
        batch
    }

    /// Per-worker statistics of the most recent run.
    pub fn get_worker_stats(&self) -> Vec<WorkerStats> {
        self.last_run
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(CaptureWorker::get_stats)
            .collect()
    }

    pub fn total_processed(&self) -> usize {
        self.get_worker_stats().iter().map(|s| s.processed_count).sum()
    }

    pub fn total_errors(&self) -> usize {
        self.get_worker_stats().iter().map(|s| s.error_count).sum()
    }

    fn set_last_run(&self, workers: Vec<CaptureWorker>) {
        *self
            .last_run
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = workers;
    }
}
