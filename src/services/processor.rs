//! Per-job processing state machine.
//!
//! `Pending → Processing → Done | Failed`. Every transition is persisted,
//! then broadcast; terminal transitions also go to the job's webhook.
//! Collaborator failures end the job as `Failed` and never escape
//! [`PhotoJobProcessor::process`].

use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::models::job::{JobStatus, JobStatusSnapshot, PhotoJob};
use crate::models::photo::ProfilePhotoRecord;
use crate::services::events::JobEvents;
use crate::services::generation::{GenerationError, PhotoGenerator};
use crate::services::job_store::{JobStore, StoreError};
use crate::services::photo_repository::PhotoRepository;
use crate::services::storage::{PhotoStorage, StorageError};
use crate::services::webhook::StatusNotifier;

/// Failure inside the pipeline; its message is stored on the job.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Photo generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Photo storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Job store failed: {0}")]
    Store(#[from] StoreError),

    #[error("Job processing panicked")]
    Panicked,
}

/// What `process` did with a job id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Done,
    Failed,
    /// Unknown id, or already claimed by another worker / earlier run.
    Skipped,
    /// The job could not be loaded; deliver the id again later.
    Retry,
}

pub struct PhotoJobProcessor {
    jobs: Arc<dyn JobStore>,
    photos: Arc<dyn PhotoRepository>,
    generator: Arc<dyn PhotoGenerator>,
    storage: Arc<dyn PhotoStorage>,
    events: Arc<JobEvents>,
    notifier: Arc<dyn StatusNotifier>,
}

impl PhotoJobProcessor {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        photos: Arc<dyn PhotoRepository>,
        generator: Arc<dyn PhotoGenerator>,
        storage: Arc<dyn PhotoStorage>,
        events: Arc<JobEvents>,
        notifier: Arc<dyn StatusNotifier>,
    ) -> Self {
        Self {
            jobs,
            photos,
            generator,
            storage,
            events,
            notifier,
        }
    }

    /// Drive one job to a terminal state.
    ///
    /// The job's temporary photo is removed on every path that claimed the
    /// job, whatever the outcome.
    pub async fn process(&self, job_id: Uuid) -> ProcessOutcome {
        let job = match self.jobs.find_by_id(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::debug!(job_id = %job_id, "Job not found, nothing to process");
                return ProcessOutcome::Skipped;
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to load job");
                return ProcessOutcome::Retry;
            }
        };

        tracing::info!(
            job_id = %job.id,
            customer_id = %job.customer_id,
            "Processing profile photo job"
        );

        let start = Instant::now();
        let result = AssertUnwindSafe(self.run(&job))
            .catch_unwind()
            .await
            .unwrap_or(Err(PipelineError::Panicked));

        let outcome = match result {
            Ok(true) => {
                metrics::counter!("photo_jobs_completed_total").increment(1);
                tracing::info!(
                    job_id = %job.id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Job completed successfully"
                );
                ProcessOutcome::Done
            }
            Ok(false) => {
                tracing::warn!(job_id = %job.id, "Job already claimed, skipping");
                return ProcessOutcome::Skipped;
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Job processing failed");
                let outcome = self.fail(&job, &e).await;
                if outcome == ProcessOutcome::Done {
                    metrics::counter!("photo_jobs_completed_total").increment(1);
                } else {
                    metrics::counter!("photo_jobs_failed_total").increment(1);
                }
                outcome
            }
        };
        metrics::histogram!("photo_job_processing_seconds").record(start.elapsed().as_secs_f64());

        if let Err(e) = job.photo.discard().await {
            tracing::warn!(
                job_id = %job.id,
                path = %job.photo.original_path.display(),
                error = %e,
                "Failed to cleanup temp photo"
            );
        }

        outcome
    }

    /// Claim and run the pipeline. `Ok(false)` means the claim was lost.
    async fn run(&self, job: &PhotoJob) -> Result<bool, PipelineError> {
        if !self.jobs.claim(job.id).await? {
            return Ok(false);
        }
        self.publish(job.id).await?;

        tracing::debug!(job_id = %job.id, "Calling Workers AI for generation");
        let generated = self.generator.generate(&job.photo).await?;

        let original_url = self.storage.store_original(&job.customer_id, &job.photo).await?;
        let generated_url = self
            .storage
            .store_generated(&job.customer_id, &job.photo, &generated)
            .await?;

        self.photos
            .save(
                &job.customer_id,
                &ProfilePhotoRecord {
                    photo_id: job.photo.id,
                    original_url: original_url.clone(),
                    generated_url: generated_url.clone(),
                },
            )
            .await?;

        self.jobs.update_result(job.id, &original_url, &generated_url).await?;

        // The job is Done from here on, whatever the re-read does.
        let snapshot = match self.publish(job.id).await {
            Ok(Some(snapshot)) => snapshot,
            other => {
                if let Err(e) = other {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to re-read completed job");
                }
                let done = PhotoJob {
                    status: JobStatus::Done,
                    original_photo_url: Some(original_url),
                    generated_photo_url: Some(generated_url),
                    error: None,
                    updated_at: Utc::now(),
                    ..job.clone()
                }
                .snapshot();
                self.events.publish(done.clone());
                done
            }
        };
        self.notifier.notify(job.callback_url.as_deref(), &snapshot);

        Ok(true)
    }

    /// Record `error` on the job and report the status the store ends up
    /// holding. A job that already reached `Done` stays `Done`.
    async fn fail(&self, job: &PhotoJob, error: &PipelineError) -> ProcessOutcome {
        let message = error.to_string();
        if let Err(e) = self
            .jobs
            .update_status(job.id, JobStatus::Failed, Some(&message))
            .await
        {
            tracing::error!(job_id = %job.id, error = %e, "Failed to record job failure");
            return ProcessOutcome::Failed;
        }

        match self.publish(job.id).await {
            Ok(Some(snapshot)) if snapshot.status == JobStatus::Done => ProcessOutcome::Done,
            Ok(Some(snapshot)) if snapshot.status == JobStatus::Failed => {
                self.notifier.notify(job.callback_url.as_deref(), &snapshot);
                ProcessOutcome::Failed
            }
            Ok(_) => ProcessOutcome::Failed,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Failed to publish job failure");
                ProcessOutcome::Failed
            }
        }
    }

    /// Re-read the job and broadcast what the store now holds.
    async fn publish(&self, job_id: Uuid) -> Result<Option<JobStatusSnapshot>, StoreError> {
        let snapshot = self.jobs.find_by_id(job_id).await?.map(|job| job.snapshot());
        if let Some(snapshot) = &snapshot {
            self.events.publish(snapshot.clone());
        }
        Ok(snapshot)
    }
}
