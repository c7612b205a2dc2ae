use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::db::photo_queries;
use crate::models::photo::ProfilePhotoRecord;
use crate::services::job_store::StoreError;

/// Stores the final customer ↔ photo association once a job succeeds.
#[async_trait]
pub trait PhotoRepository: Send + Sync {
    async fn save(&self, customer_id: &str, record: &ProfilePhotoRecord) -> Result<(), StoreError>;

    async fn find(&self, customer_id: &str) -> Result<Option<ProfilePhotoRecord>, StoreError>;
}

pub struct PgPhotoRepository {
    pool: PgPool,
}

impl PgPhotoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PhotoRepository for PgPhotoRepository {
    async fn save(&self, customer_id: &str, record: &ProfilePhotoRecord) -> Result<(), StoreError> {
        Ok(photo_queries::upsert_profile_photo(&self.pool, customer_id, record).await?)
    }

    async fn find(&self, customer_id: &str) -> Result<Option<ProfilePhotoRecord>, StoreError> {
        Ok(photo_queries::get_profile_photo(&self.pool, customer_id).await?)
    }
}

#[derive(Default)]
pub struct InMemoryPhotoRepository {
    photos: RwLock<HashMap<String, ProfilePhotoRecord>>,
}

impl InMemoryPhotoRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PhotoRepository for InMemoryPhotoRepository {
    async fn save(&self, customer_id: &str, record: &ProfilePhotoRecord) -> Result<(), StoreError> {
        self.photos
            .write()
            .await
            .insert(customer_id.to_string(), record.clone());
        Ok(())
    }

    async fn find(&self, customer_id: &str) -> Result<Option<ProfilePhotoRecord>, StoreError> {
        Ok(self.photos.read().await.get(customer_id).cloned())
    }
}
