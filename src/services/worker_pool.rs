use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::error::ServiceError;
use crate::services::job_store::JobStore;
use crate::services::processor::{PhotoJobProcessor, ProcessOutcome};
use crate::services::queue::{Dequeued, JobQueue};

/// Back-off when the queue is idle or erroring.
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_secs(1);

/// Fixed set of workers consuming job ids from a [`JobQueue`].
///
/// Each worker runs one job at a time. Jobs run on their own task so a
/// panic inside one job is logged and the worker carries on.
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn start(
        size: usize,
        queue: Arc<dyn JobQueue>,
        processor: Arc<PhotoJobProcessor>,
        idle_backoff: Duration,
    ) -> Self {
        let handles = (0..size.max(1))
            .map(|worker| {
                let queue = Arc::clone(&queue);
                let processor = Arc::clone(&processor);
                tokio::spawn(run_worker(worker, queue, processor, idle_backoff))
            })
            .collect();

        tracing::info!(workers = size.max(1), "Worker pool started");

        Self {
            queue,
            handles: Mutex::new(handles),
        }
    }

    /// Stop accepting work and wait for every worker to finish what it holds.
    pub async fn shutdown(&self) {
        self.queue.close();

        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task ended abnormally");
            }
        }

        tracing::info!("Worker pool shut down");
    }
}

/// Re-enqueue jobs still `Pending` in the store, e.g. after a restart.
///
/// Ids that are also still queued get delivered twice; the second delivery
/// loses the claim and is skipped.
pub async fn recover_pending(
    jobs: &dyn JobStore,
    queue: &dyn JobQueue,
    limit: usize,
) -> Result<usize, ServiceError> {
    let pending = jobs.list_pending(limit).await?;
    for job in &pending {
        queue.enqueue(job.id).await?;
    }
    if !pending.is_empty() {
        tracing::info!(count = pending.len(), "Re-enqueued pending jobs");
    }
    Ok(pending.len())
}

async fn run_worker(
    worker: usize,
    queue: Arc<dyn JobQueue>,
    processor: Arc<PhotoJobProcessor>,
    idle_backoff: Duration,
) {
    tracing::debug!(worker, "Worker ready");

    loop {
        match queue.dequeue().await {
            Ok(Dequeued::Job(job_id)) => {
                let processor = Arc::clone(&processor);
                let job = tokio::spawn(async move { processor.process(job_id).await });
                match job.await {
                    Ok(ProcessOutcome::Retry) => {
                        sleep(idle_backoff).await;
                        if let Err(e) = queue.enqueue(job_id).await {
                            tracing::error!(
                                worker,
                                job_id = %job_id,
                                error = %e,
                                "Failed to re-enqueue job, it stays pending until recovery"
                            );
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(worker, job_id = %job_id, error = %e, "Job task panicked");
                    }
                }

                if let Err(e) = queue.complete(job_id).await {
                    tracing::warn!(worker, job_id = %job_id, error = %e, "Failed to acknowledge job");
                }
            }
            Ok(Dequeued::Empty) => {
                tracing::trace!(worker, "No jobs available, sleeping");
                sleep(idle_backoff).await;
            }
            Ok(Dequeued::Closed) => break,
            Err(e) => {
                tracing::error!(worker, error = %e, "Error dequeuing job, will retry");
                sleep(idle_backoff).await;
            }
        }
    }

    tracing::debug!(worker, "Worker stopped");
}
