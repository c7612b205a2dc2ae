use std::path::PathBuf;
use std::sync::Arc;

use crate::services::{
    events::JobEvents, job_store::JobStore, queue::JobQueue, status::JobStatusService,
    submission::PhotoJobService,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobStore>,
    pub queue: Arc<dyn JobQueue>,
    pub events: Arc<JobEvents>,
    pub submissions: Arc<PhotoJobService>,
    pub status: Arc<JobStatusService>,
    /// Directory uploads are materialized into before submission.
    pub upload_dir: PathBuf,
}

impl AppState {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        events: Arc<JobEvents>,
        poll_interval: std::time::Duration,
        upload_dir: PathBuf,
    ) -> Self {
        let submissions = PhotoJobService::new(jobs.clone(), events.clone(), queue.clone());
        let status = JobStatusService::new(jobs.clone(), events.clone(), poll_interval);
        Self {
            jobs,
            queue,
            events,
            submissions: Arc::new(submissions),
            status: Arc::new(status),
            upload_dir,
        }
    }
}
