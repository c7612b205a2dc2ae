use garde::Validate;
use serde::Deserialize;
use std::time::Duration;

use crate::services::status::MAX_STATUS_WAIT;

/// Metadata accompanying a photo upload.
#[derive(Debug, Validate)]
pub struct SubmitPhotoRequest {
    #[garde(length(min = 1, max = 128))]
    pub customer_id: String,

    #[garde(url, length(max = 2048))]
    pub callback_url: Option<String>,
}

/// Query string for `GET .../photos/{job_id}/status`.
#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    /// Seconds to wait for a terminal status; negative values read as 0 and
    /// anything above [`MAX_STATUS_WAIT`] as the maximum.
    #[serde(rename = "waitSeconds", default)]
    pub wait_seconds: i64,
}

impl StatusQuery {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_seconds.max(0) as u64).min(MAX_STATUS_WAIT)
    }
}

/// Query string for `GET .../photos/stream`.
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
}
