//! Read side of the job lifecycle: point reads, bounded waits and the
//! per-customer live stream.

use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::job::JobStatusSnapshot;
use crate::services::events::JobEvents;
use crate::services::job_store::JobStore;

/// Default re-read interval for [`JobStatusService::wait_for_completion`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Longest a single status read may block.
pub const MAX_STATUS_WAIT: Duration = Duration::from_secs(300);

pub struct JobStatusService {
    jobs: Arc<dyn JobStore>,
    events: Arc<JobEvents>,
    poll_interval: Duration,
}

impl JobStatusService {
    pub fn new(jobs: Arc<dyn JobStore>, events: Arc<JobEvents>, poll_interval: Duration) -> Self {
        Self {
            jobs,
            events,
            poll_interval,
        }
    }

    pub async fn find(&self, job_id: Uuid) -> Result<JobStatusSnapshot, ServiceError> {
        self.jobs
            .find_by_id(job_id)
            .await?
            .map(|job| job.snapshot())
            .ok_or_else(|| ServiceError::job_not_found(job_id))
    }

    /// Re-read the job until it is terminal or `timeout` has passed, and
    /// return whatever is current at that point.
    ///
    /// Processing is never cancelled by a caller giving up. A zero timeout is
    /// a single read; timeouts above [`MAX_STATUS_WAIT`] are capped.
    pub async fn wait_for_completion(
        &self,
        job_id: Uuid,
        timeout: Duration,
    ) -> Result<JobStatusSnapshot, ServiceError> {
        let now = Instant::now();
        let deadline = now
            .checked_add(timeout.min(MAX_STATUS_WAIT))
            .unwrap_or(now);
        let mut snapshot = self.find(job_id).await?;

        while !snapshot.status.is_terminal() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(self.poll_interval.min(deadline - now)).await;
            snapshot = self.find(job_id).await?;
        }

        Ok(snapshot)
    }

    /// Status of a job as seen by its owner. A job belonging to another
    /// customer is reported as not found.
    pub async fn find_for_customer(
        &self,
        customer_id: &str,
        job_id: Uuid,
        wait: Duration,
    ) -> Result<JobStatusSnapshot, ServiceError> {
        let snapshot = self.find(job_id).await?;
        if snapshot.customer_id != customer_id {
            return Err(ServiceError::job_not_found(job_id));
        }
        if wait.is_zero() || snapshot.status.is_terminal() {
            return Ok(snapshot);
        }
        self.wait_for_completion(job_id, wait).await
    }

    /// Live snapshots for a customer, optionally narrowed to one job.
    ///
    /// With a job id the stream starts with that job's current snapshot. The
    /// subscription is opened before the current state is read, so a
    /// transition landing in between is still delivered; live snapshots not
    /// newer than the initial one are dropped.
    pub async fn status_stream(
        &self,
        customer_id: &str,
        job_id: Option<Uuid>,
    ) -> Result<BoxStream<'static, JobStatusSnapshot>, ServiceError> {
        if customer_id.trim().is_empty() {
            return Err(ServiceError::InvalidArgument(
                "customer id is required".to_string(),
            ));
        }

        let live = self.events.subscribe_by_customer(customer_id);

        let Some(job_id) = job_id else {
            return Ok(Box::pin(live));
        };

        let initial = self
            .find_for_customer(customer_id, job_id, Duration::ZERO)
            .await?;
        let seen = initial.clone();
        let updates = live.filter(move |snapshot| {
            snapshot.job_id == job_id && snapshot.updated_at >= seen.updated_at && *snapshot != seen
        });

        Ok(Box::pin(tokio_stream::once(initial).chain(updates)))
    }
}
