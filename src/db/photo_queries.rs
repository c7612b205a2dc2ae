use sqlx::{PgPool, Row};

use crate::models::photo::ProfilePhotoRecord;

/// Insert or replace the customer's current profile photo pair
pub async fn upsert_profile_photo(
    pool: &PgPool,
    customer_id: &str,
    record: &ProfilePhotoRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO customer_profile_photos (customer_id, photo_id, original_url, generated_url)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (customer_id) DO UPDATE
        SET photo_id = EXCLUDED.photo_id,
            original_url = EXCLUDED.original_url,
            generated_url = EXCLUDED.generated_url,
            updated_at = NOW()
        "#,
    )
    .bind(customer_id)
    .bind(record.photo_id)
    .bind(&record.original_url)
    .bind(&record.generated_url)
    .execute(pool)
    .await?;

    Ok(())
}

/// Current profile photo pair for a customer, if one was ever stored
pub async fn get_profile_photo(
    pool: &PgPool,
    customer_id: &str,
) -> Result<Option<ProfilePhotoRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT photo_id, original_url, generated_url
        FROM customer_profile_photos
        WHERE customer_id = $1
        "#,
    )
    .bind(customer_id)
    .fetch_optional(pool)
    .await?;

    Ok(match row {
        Some(r) => Some(ProfilePhotoRecord {
            photo_id: r.try_get("photo_id")?,
            original_url: r.try_get("original_url")?,
            generated_url: r.try_get("generated_url")?,
        }),
        None => None,
    })
}
