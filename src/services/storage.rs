use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};

use crate::models::photo::{GeneratedPhoto, ProfilePhoto};

/// Persists photos and returns the URL they are served from.
#[async_trait]
pub trait PhotoStorage: Send + Sync {
    /// Store the customer's original upload.
    async fn store_original(
        &self,
        customer_id: &str,
        photo: &ProfilePhoto,
    ) -> Result<String, StorageError>;

    /// Store the generated variant next to its original.
    async fn store_generated(
        &self,
        customer_id: &str,
        photo: &ProfilePhoto,
        generated: &GeneratedPhoto,
    ) -> Result<String, StorageError>;
}

/// Customer ids are free text; keys and public URLs carry them encoded.
fn customer_segment(customer_id: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(customer_id)
}

/// Object key for the original upload.
pub fn original_key(customer_id: &str, photo: &ProfilePhoto) -> String {
    format!(
        "customers/{}/photos/{}/original.{}",
        customer_segment(customer_id),
        photo.id,
        photo.extension()
    )
}

/// Object key for the generated variant.
pub fn generated_key(customer_id: &str, photo: &ProfilePhoto, generated: &GeneratedPhoto) -> String {
    format!(
        "customers/{}/photos/{}/generated.{}",
        customer_segment(customer_id),
        photo.id,
        generated.extension()
    )
}

/// Client for Cloudflare R2 object storage (S3-compatible).
pub struct R2Client {
    bucket: Box<Bucket>,
    public_url: String,
}

impl R2Client {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        public_url: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            bucket,
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }

    /// Upload bytes to R2.
    pub async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(StorageError::S3)?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StorageError::Rejected { key: key.to_string(), status });
        }
        Ok(())
    }

    /// Public URL an object key is served from.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_url, key)
    }
}

#[async_trait]
impl PhotoStorage for R2Client {
    async fn store_original(
        &self,
        customer_id: &str,
        photo: &ProfilePhoto,
    ) -> Result<String, StorageError> {
        let data = tokio::fs::read(&photo.original_path).await?;
        let key = original_key(customer_id, photo);

        self.upload(&key, &data, &photo.content_type).await?;
        tracing::debug!(customer_id, key = %key, bytes = data.len(), "Stored original photo");

        Ok(self.public_url(&key))
    }

    async fn store_generated(
        &self,
        customer_id: &str,
        photo: &ProfilePhoto,
        generated: &GeneratedPhoto,
    ) -> Result<String, StorageError> {
        let key = generated_key(customer_id, photo, generated);

        self.upload(&key, &generated.bytes, &generated.content_type).await?;
        tracing::debug!(customer_id, key = %key, bytes = generated.bytes.len(), "Stored generated photo");

        Ok(self.public_url(&key))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Storage rejected {key} with HTTP {status}")]
    Rejected { key: String, status: u16 },

    #[error("Failed to read photo: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage configuration error: {0}")]
    Config(String),
}
