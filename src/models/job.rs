use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::photo::ProfilePhoto;

/// Lifecycle of a profile photo job.
///
/// Serialized as `"PENDING"` etc. on the wire; `Display`/`FromStr` use the
/// lower-case form stored in the `photo_jobs.status` column.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Done,
        JobStatus::Failed,
    ];

    /// `Done` and `Failed` are final; a terminal job never mutates again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    /// Whether a job in `self` may move to `next`.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Done)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    /// Statuses from which `self` can be reached in one step.
    pub fn predecessors(self) -> Vec<JobStatus> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_advance_to(self))
            .collect()
    }
}

/// Authoritative record of one photo submission.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoJob {
    pub id: Uuid,
    pub customer_id: String,
    pub photo: ProfilePhoto,
    pub status: JobStatus,
    pub original_photo_url: Option<String>,
    pub generated_photo_url: Option<String>,
    pub callback_url: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PhotoJob {
    pub fn snapshot(&self) -> JobStatusSnapshot {
        JobStatusSnapshot::from(self)
    }
}

/// Point-in-time view of a job, shared by status queries, the live stream
/// and webhook payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusSnapshot {
    pub job_id: Uuid,
    pub customer_id: String,
    pub status: JobStatus,
    pub original_photo_url: Option<String>,
    pub generated_photo_url: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&PhotoJob> for JobStatusSnapshot {
    fn from(job: &PhotoJob) -> Self {
        Self {
            job_id: job.id,
            customer_id: job.customer_id.clone(),
            status: job.status,
            original_photo_url: job.original_photo_url.clone(),
            generated_photo_url: job.generated_photo_url.clone(),
            error: job.error.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::str::FromStr;

    fn sample_job() -> PhotoJob {
        let now = Utc::now();
        PhotoJob {
            id: Uuid::new_v4(),
            customer_id: "c1".to_string(),
            photo: ProfilePhoto {
                id: Uuid::new_v4(),
                original_path: PathBuf::from("/tmp/profile-photo-c1-face.png"),
                file_name: "face.png".to_string(),
                content_type: "image/png".to_string(),
            },
            status: JobStatus::Failed,
            original_photo_url: None,
            generated_photo_url: None,
            callback_url: Some("http://cb.test/hook".to_string()),
            error: Some("generation timed out".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_transitions_only_move_forward() {
        assert!(JobStatus::Pending.can_advance_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_advance_to(JobStatus::Done));
        assert!(JobStatus::Processing.can_advance_to(JobStatus::Failed));
        assert!(!JobStatus::Processing.can_advance_to(JobStatus::Pending));
        assert!(!JobStatus::Pending.can_advance_to(JobStatus::Done));
        assert!(!JobStatus::Done.can_advance_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_advance_to(JobStatus::Processing));
    }

    #[test]
    fn test_predecessors() {
        assert!(JobStatus::Pending.predecessors().is_empty());
        assert_eq!(JobStatus::Done.predecessors(), vec![JobStatus::Processing]);
        assert_eq!(
            JobStatus::Failed.predecessors(),
            vec![JobStatus::Pending, JobStatus::Processing]
        );
    }

    #[test]
    fn test_status_column_names() {
        assert_eq!(JobStatus::Processing.to_string(), "processing");
        assert_eq!(JobStatus::from_str("done").unwrap(), JobStatus::Done);
        assert!(JobStatus::from_str("completed").is_err());
    }

    #[test]
    fn test_snapshot_wire_schema() {
        let job = sample_job();
        let json = serde_json::to_value(job.snapshot()).unwrap();

        assert_eq!(json["jobId"], job.id.to_string());
        assert_eq!(json["customerId"], "c1");
        assert_eq!(json["status"], "FAILED");
        assert!(json["originalPhotoUrl"].is_null());
        assert!(json["generatedPhotoUrl"].is_null());
        assert_eq!(json["error"], "generation timed out");
        assert!(json["createdAt"].is_string());
        assert!(json["updatedAt"].is_string());
        // the temp path and callback never leave the service
        assert!(json.get("photo").is_none());
        assert!(json.get("callbackUrl").is_none());
    }
}
