use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::job::{JobStatus, PhotoJob};
use crate::models::photo::ProfilePhoto;

const JOB_COLUMNS: &str = r#"
    id, customer_id, photo_id, original_path, file_name, content_type, status,
    original_photo_url, generated_photo_url, callback_url, error, created_at, updated_at
"#;

fn row_to_job(row: &PgRow) -> Result<PhotoJob, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status_str).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    let original_path: String = row.try_get("original_path")?;

    Ok(PhotoJob {
        id: row.try_get("id")?,
        customer_id: row.try_get("customer_id")?,
        photo: ProfilePhoto {
            id: row.try_get("photo_id")?,
            original_path: PathBuf::from(original_path),
            file_name: row.try_get("file_name")?,
            content_type: row.try_get("content_type")?,
        },
        status,
        original_photo_url: row.try_get("original_photo_url")?,
        generated_photo_url: row.try_get("generated_photo_url")?,
        callback_url: row.try_get("callback_url")?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a new pending job
pub async fn create_job(
    pool: &PgPool,
    customer_id: &str,
    photo: &ProfilePhoto,
    callback_url: Option<&str>,
) -> Result<PhotoJob, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO photo_jobs (id, customer_id, photo_id, original_path, file_name, content_type,
                                status, callback_url)
        VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7)
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(customer_id)
    .bind(photo.id)
    .bind(photo.original_path.to_string_lossy().into_owned())
    .bind(&photo.file_name)
    .bind(&photo.content_type)
    .bind(callback_url)
    .fetch_one(pool)
    .await?;

    row_to_job(&row)
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<PhotoJob>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM photo_jobs WHERE id = $1"))
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_job).transpose()
}

/// Move a pending job to processing. Returns false when another caller got there first.
pub async fn claim_job(pool: &PgPool, job_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE photo_jobs
        SET status = 'processing',
            updated_at = GREATEST(NOW(), updated_at)
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Update job status, only along a forward transition
pub async fn update_job_status(
    pool: &PgPool,
    job_id: Uuid,
    status: JobStatus,
    error: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let from: Vec<String> = status.predecessors().iter().map(|s| s.to_string()).collect();

    let result = sqlx::query(
        r#"
        UPDATE photo_jobs
        SET status = $1,
            error = $2,
            updated_at = GREATEST(NOW(), updated_at)
        WHERE id = $3 AND status = ANY($4)
        "#,
    )
    .bind(status.to_string())
    .bind(error)
    .bind(job_id)
    .bind(from)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Record both photo URLs and mark the job done in one statement
pub async fn update_job_result(
    pool: &PgPool,
    job_id: Uuid,
    original_url: &str,
    generated_url: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE photo_jobs
        SET status = 'done',
            original_photo_url = $1,
            generated_photo_url = $2,
            error = NULL,
            updated_at = GREATEST(NOW(), updated_at)
        WHERE id = $3 AND status = 'processing'
        "#,
    )
    .bind(original_url)
    .bind(generated_url)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Get pending jobs, oldest first (startup recovery)
pub async fn get_pending_jobs(pool: &PgPool, limit: i64) -> Result<Vec<PhotoJob>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM photo_jobs
        WHERE status = 'pending'
        ORDER BY created_at ASC
        LIMIT $1
        "#
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_job).collect()
}
