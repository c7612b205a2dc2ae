use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::stream::Stream;
use garde::Validate;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::ServiceError;
use crate::models::job::JobStatusSnapshot;
use crate::models::photo::ProfilePhoto;
use crate::models::requests::{StatusQuery, StreamQuery, SubmitPhotoRequest};

const STREAM_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Malformed ids are reported like unknown ones.
fn parse_job_id(raw: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ServiceError::job_not_found(raw))
}

fn upload_error(e: impl std::fmt::Display) -> ServiceError {
    ServiceError::Upload(e.to_string())
}

/// POST /api/v1/customers/{customer_id}/photos: upload a profile photo.
///
/// Multipart fields: `photo` (image file) and optional `callbackUrl`.
pub async fn submit_photo(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut callback_url: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        match field.name() {
            Some("photo") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let data = field.bytes().await.map_err(upload_error)?;
                upload = Some((file_name, data.to_vec()));
            }
            Some("callbackUrl") => {
                let text = field.text().await.map_err(upload_error)?;
                callback_url = Some(text.trim().to_string()).filter(|u| !u.is_empty());
            }
            _ => {}
        }
    }

    let (file_name, data) =
        upload.ok_or_else(|| ServiceError::Upload("missing `photo` field".to_string()))?;
    if data.is_empty() {
        return Err(ServiceError::Upload("photo is empty".to_string()));
    }

    let format = image::guess_format(&data).map_err(|_| {
        ServiceError::UnsupportedMedia("photo is not a recognized image format".to_string())
    })?;

    let request = SubmitPhotoRequest {
        customer_id: customer_id.trim().to_string(),
        callback_url,
    };
    request
        .validate()
        .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;

    let photo = ProfilePhoto::materialize(
        &state.upload_dir,
        &request.customer_id,
        &file_name,
        format.to_mime_type(),
        &data,
    )
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to write upload to disk");
        upload_error("upload could not be stored")
    })?;

    let snapshot = state
        .submissions
        .submit(&request.customer_id, photo, request.callback_url.as_deref())
        .await?;

    let location = format!(
        "/api/v1/customers/{}/photos/{}/status",
        snapshot.customer_id, snapshot.job_id
    );

    Ok((
        StatusCode::ACCEPTED,
        [(header::LOCATION, location)],
        Json(snapshot),
    ))
}

/// GET /api/v1/customers/{customer_id}/photos/{job_id}/status
pub async fn get_photo_status(
    State(state): State<AppState>,
    Path((customer_id, job_id)): Path<(String, String)>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<JobStatusSnapshot>, ServiceError> {
    let job_id = parse_job_id(&job_id)?;
    let snapshot = state
        .status
        .find_for_customer(&customer_id, job_id, query.wait())
        .await?;
    Ok(Json(snapshot))
}

/// GET /api/v1/customers/{customer_id}/photos/stream: SSE status updates.
pub async fn stream_photo_status(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServiceError> {
    let job_id = query
        .job_id
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(parse_job_id)
        .transpose()?;

    let snapshots = state.status.status_stream(&customer_id, job_id).await?;

    tracing::info!(
        customer_id = %customer_id,
        job_id = ?job_id,
        "Client connected to photo status stream"
    );

    let events = snapshots.filter_map(|snapshot| match serde_json::to_string(&snapshot) {
        Ok(json) => Some(Ok::<_, Infallible>(Event::default().event("status").data(json))),
        Err(e) => {
            tracing::warn!(job_id = %snapshot.job_id, error = %e, "Failed to serialize status event");
            None
        }
    });

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(STREAM_KEEP_ALIVE)
            .text("heartbeat"),
    ))
}
