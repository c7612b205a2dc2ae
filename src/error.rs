use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::services::job_store::StoreError;
use crate::services::queue::QueueError;

/// Errors surfaced to callers of the submission, query and stream operations.
///
/// Pipeline failures never appear here; they are recorded on the job as
/// `status = FAILED` instead.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Upload rejected: {0}")]
    Upload(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMedia(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl ServiceError {
    pub fn job_not_found(id: impl ToString) -> Self {
        ServiceError::NotFound {
            entity: "Job",
            id: id.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ServiceError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ServiceError::InvalidArgument(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", msg.clone())
            }
            ServiceError::Upload(msg) => (StatusCode::BAD_REQUEST, "BAD_UPLOAD", msg.clone()),
            ServiceError::UnsupportedMedia(msg) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "UNSUPPORTED_MEDIA_TYPE",
                msg.clone(),
            ),
            ServiceError::Store(err) => {
                tracing::error!(error = %err, "Job store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
            ServiceError::Queue(err) => {
                tracing::error!(error = %err, "Job queue error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ServiceError::job_not_found("abc"), StatusCode::NOT_FOUND),
            (
                ServiceError::InvalidArgument("customer_id is required".into()),
                StatusCode::BAD_REQUEST,
            ),
            (ServiceError::Upload("missing photo".into()), StatusCode::BAD_REQUEST),
            (
                ServiceError::UnsupportedMedia("not an image".into()),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (ServiceError::Queue(QueueError::Closed), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_not_found_message() {
        let err = ServiceError::job_not_found("abc");
        assert_eq!(err.to_string(), "Job abc not found");
    }
}
