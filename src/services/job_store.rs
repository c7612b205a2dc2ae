//! Durable record of job state.
//!
//! [`JobStore`] is the single source of truth for every job. Two backends
//! implement it: [`PgJobStore`] for production and [`InMemoryJobStore`] for
//! tests and single-process development; `JOB_STORE` picks one at startup.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::{self, queries};
use crate::models::job::{JobStatus, PhotoJob};
use crate::models::photo::ProfilePhoto;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job in `Pending`.
    async fn create(
        &self,
        customer_id: &str,
        photo: &ProfilePhoto,
        callback_url: Option<&str>,
    ) -> Result<PhotoJob, StoreError>;

    async fn find_by_id(&self, job_id: Uuid) -> Result<Option<PhotoJob>, StoreError>;

    /// Atomically move `Pending` to `Processing`.
    ///
    /// Returns `false` if the job does not exist or is no longer pending, so
    /// a job id delivered twice is only ever processed once.
    async fn claim(&self, job_id: Uuid) -> Result<bool, StoreError>;

    /// Apply a forward status transition. Backward moves and writes to
    /// terminal jobs are ignored. `error` is kept only for `Failed`.
    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Record both URLs and move `Processing` to `Done` in one write.
    async fn update_result(
        &self,
        job_id: Uuid,
        original_url: &str,
        generated_url: &str,
    ) -> Result<(), StoreError>;

    /// Pending jobs, oldest first.
    async fn list_pending(&self, limit: usize) -> Result<Vec<PhotoJob>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// PostgreSQL-backed job store.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(
        &self,
        customer_id: &str,
        photo: &ProfilePhoto,
        callback_url: Option<&str>,
    ) -> Result<PhotoJob, StoreError> {
        Ok(queries::create_job(&self.pool, customer_id, photo, callback_url).await?)
    }

    async fn find_by_id(&self, job_id: Uuid) -> Result<Option<PhotoJob>, StoreError> {
        Ok(queries::get_job(&self.pool, job_id).await?)
    }

    async fn claim(&self, job_id: Uuid) -> Result<bool, StoreError> {
        Ok(queries::claim_job(&self.pool, job_id).await?)
    }

    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let error = error.filter(|_| status == JobStatus::Failed);
        let applied = queries::update_job_status(&self.pool, job_id, status, error).await?;
        if !applied {
            tracing::debug!(job_id = %job_id, status = %status, "Status update skipped");
        }
        Ok(())
    }

    async fn update_result(
        &self,
        job_id: Uuid,
        original_url: &str,
        generated_url: &str,
    ) -> Result<(), StoreError> {
        let applied =
            queries::update_job_result(&self.pool, job_id, original_url, generated_url).await?;
        if !applied {
            tracing::debug!(job_id = %job_id, "Result update skipped, job not processing");
        }
        Ok(())
    }

    async fn list_pending(&self, limit: usize) -> Result<Vec<PhotoJob>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Ok(queries::get_pending_jobs(&self.pool, limit).await?)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(db::ping(&self.pool).await?)
    }
}

/// Job store held in process memory.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<Uuid, PhotoJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(
        &self,
        customer_id: &str,
        photo: &ProfilePhoto,
        callback_url: Option<&str>,
    ) -> Result<PhotoJob, StoreError> {
        let now = Utc::now();
        let job = PhotoJob {
            id: Uuid::new_v4(),
            customer_id: customer_id.to_string(),
            photo: photo.clone(),
            status: JobStatus::Pending,
            original_photo_url: None,
            generated_photo_url: None,
            callback_url: callback_url.map(str::to_string),
            error: None,
            created_at: now,
            updated_at: now,
        };

        self.jobs.write().await.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find_by_id(&self, job_id: Uuid) -> Result<Option<PhotoJob>, StoreError> {
        Ok(self.jobs.read().await.get(&job_id).cloned())
    }

    async fn claim(&self, job_id: Uuid) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Processing;
                job.updated_at = Utc::now().max(job.updated_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&job_id) {
            if !job.status.can_advance_to(status) {
                tracing::debug!(job_id = %job_id, from = %job.status, to = %status, "Status update skipped");
                return Ok(());
            }
            job.status = status;
            job.error = error.filter(|_| status == JobStatus::Failed).map(str::to_string);
            job.updated_at = Utc::now().max(job.updated_at);
        }
        Ok(())
    }

    async fn update_result(
        &self,
        job_id: Uuid,
        original_url: &str,
        generated_url: &str,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&job_id) {
            if job.status != JobStatus::Processing {
                tracing::debug!(job_id = %job_id, status = %job.status, "Result update skipped, job not processing");
                return Ok(());
            }
            job.status = JobStatus::Done;
            job.original_photo_url = Some(original_url.to_string());
            job.generated_photo_url = Some(generated_url.to_string());
            job.error = None;
            job.updated_at = Utc::now().max(job.updated_at);
        }
        Ok(())
    }

    async fn list_pending(&self, limit: usize) -> Result<Vec<PhotoJob>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut pending: Vec<PhotoJob> = jobs
            .values()
            .filter(|job| job.status == JobStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|job| job.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
