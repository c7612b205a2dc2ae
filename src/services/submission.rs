use std::sync::Arc;

use crate::error::ServiceError;
use crate::models::job::{JobStatus, JobStatusSnapshot};
use crate::models::photo::ProfilePhoto;
use crate::services::events::JobEvents;
use crate::services::job_store::JobStore;
use crate::services::queue::JobQueue;

/// Error recorded on a job the queue refused.
const NOT_SCHEDULED: &str = "job could not be scheduled";

/// Accepts photos and schedules them for background processing.
pub struct PhotoJobService {
    jobs: Arc<dyn JobStore>,
    events: Arc<JobEvents>,
    queue: Arc<dyn JobQueue>,
}

impl PhotoJobService {
    pub fn new(jobs: Arc<dyn JobStore>, events: Arc<JobEvents>, queue: Arc<dyn JobQueue>) -> Self {
        Self { jobs, events, queue }
    }

    /// Create a `Pending` job for an already-materialized photo and return
    /// its first snapshot. Never waits on generation.
    ///
    /// The photo's temp file is owned by the job from here on; on any error
    /// it is removed before returning.
    pub async fn submit(
        &self,
        customer_id: &str,
        photo: ProfilePhoto,
        callback_url: Option<&str>,
    ) -> Result<JobStatusSnapshot, ServiceError> {
        if customer_id.trim().is_empty() {
            discard(&photo).await;
            return Err(ServiceError::InvalidArgument(
                "customer id must not be blank".to_string(),
            ));
        }

        let callback_url = callback_url.map(str::trim).filter(|u| !u.is_empty());

        let job = match self.jobs.create(customer_id, &photo, callback_url).await {
            Ok(job) => job,
            Err(e) => {
                discard(&photo).await;
                return Err(e.into());
            }
        };

        let snapshot = job.snapshot();
        self.events.publish(snapshot.clone());

        if let Err(e) = self.queue.enqueue(job.id).await {
            tracing::error!(job_id = %job.id, error = %e, "Failed to schedule job");
            self.jobs
                .update_status(job.id, JobStatus::Failed, Some(NOT_SCHEDULED))
                .await?;
            if let Some(failed) = self.jobs.find_by_id(job.id).await? {
                self.events.publish(failed.snapshot());
            }
            discard(&photo).await;
            return Err(e.into());
        }

        metrics::counter!("photo_jobs_submitted_total").increment(1);
        tracing::info!(
            job_id = %job.id,
            customer_id = %customer_id,
            callback = callback_url.is_some(),
            "Profile photo job submitted"
        );

        Ok(snapshot)
    }
}

async fn discard(photo: &ProfilePhoto) {
    if let Err(e) = photo.discard().await {
        tracing::warn!(
            path = %photo.original_path.display(),
            error = %e,
            "Failed to cleanup rejected upload"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::job_store::InMemoryJobStore;
    use crate::services::queue::{Dequeued, InProcessQueue};
    use tokio_stream::StreamExt;

    async fn photo(dir: &std::path::Path) -> ProfilePhoto {
        ProfilePhoto::materialize(dir, "c1", "me.png", "image/png", b"png-bytes")
            .await
            .unwrap()
    }

    fn service() -> (PhotoJobService, Arc<InMemoryJobStore>, Arc<JobEvents>, Arc<InProcessQueue>) {
        let jobs = Arc::new(InMemoryJobStore::new());
        let events = Arc::new(JobEvents::default());
        let queue = Arc::new(InProcessQueue::new());
        let service = PhotoJobService::new(jobs.clone(), events.clone(), queue.clone());
        (service, jobs, events, queue)
    }

    #[tokio::test]
    async fn test_submit_creates_publishes_and_enqueues() {
        let dir = tempfile::tempdir().unwrap();
        let (service, jobs, events, queue) = service();
        let stream = events.subscribe_by_customer("c1");
        tokio::pin!(stream);

        let snapshot = service
            .submit("c1", photo(dir.path()).await, Some("http://cb.test/hook"))
            .await
            .unwrap();

        assert_eq!(snapshot.status, JobStatus::Pending);
        assert_eq!(snapshot.customer_id, "c1");
        assert!(snapshot.generated_photo_url.is_none());

        let stored = jobs.find_by_id(snapshot.job_id).await.unwrap().unwrap();
        assert_eq!(stored.callback_url.as_deref(), Some("http://cb.test/hook"));
        assert!(stored.photo.original_path.exists());

        assert_eq!(stream.next().await, Some(snapshot.clone()));
        assert_eq!(queue.dequeue().await.unwrap(), Dequeued::Job(snapshot.job_id));
    }

    #[tokio::test]
    async fn test_blank_callback_is_stored_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let (service, jobs, _, _) = service();

        let snapshot = service
            .submit("c1", photo(dir.path()).await, Some("  "))
            .await
            .unwrap();

        let stored = jobs.find_by_id(snapshot.job_id).await.unwrap().unwrap();
        assert!(stored.callback_url.is_none());
    }

    #[tokio::test]
    async fn test_blank_customer_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _, _, queue) = service();
        let photo = photo(dir.path()).await;
        let path = photo.original_path.clone();

        let err = service.submit("   ", photo, None).await.unwrap_err();

        assert!(matches!(err, ServiceError::InvalidArgument(_)));
        assert!(!path.exists());
        assert_eq!(queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_closed_queue_fails_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let (service, jobs, events, queue) = service();
        let stream = events.subscribe_by_customer("c1");
        tokio::pin!(stream);
        queue.close();

        let photo = photo(dir.path()).await;
        let path = photo.original_path.clone();
        let err = service.submit("c1", photo, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Queue(_)));
        assert!(!path.exists());

        let pending = stream.next().await.unwrap();
        assert_eq!(pending.status, JobStatus::Pending);
        let failed = stream.next().await.unwrap();
        assert_eq!(failed.job_id, pending.job_id);
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some(NOT_SCHEDULED));

        let stored = jobs.find_by_id(pending.job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
    }
}
