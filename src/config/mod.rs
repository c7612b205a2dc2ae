use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Where jobs and photo associations are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStoreBackend {
    Postgres,
    Memory,
}

/// Scheduling layer between submission and the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackend {
    InProcess,
    Redis,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("{0} is required")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_job_store")]
    pub job_store: JobStoreBackend,

    /// PostgreSQL connection string, required for the postgres job store.
    pub database_url: Option<String>,

    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_queue_backend")]
    pub queue_backend: QueueBackend,

    /// Redis connection string, required for the redis queue.
    pub redis_url: Option<String>,

    /// Cloudflare account ID
    pub cf_account_id: String,

    /// Cloudflare Workers AI API token
    pub cf_api_token: String,

    #[serde(default = "default_generation_model")]
    pub generation_model: String,

    #[serde(default = "default_generation_prompt")]
    pub generation_prompt: String,

    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,

    /// R2 bucket name
    pub r2_bucket: String,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: String,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: String,

    /// R2 endpoint URL
    pub r2_endpoint: String,

    /// Public base URL objects are served from.
    pub r2_public_url: String,

    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    #[serde(default = "default_status_poll_interval_ms")]
    pub status_poll_interval_ms: u64,

    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,

    #[serde(default = "default_event_buffer_capacity")]
    pub event_buffer_capacity: usize,

    /// Directory uploads are written to; the OS temp dir when unset.
    pub upload_dir: Option<PathBuf>,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_job_store() -> JobStoreBackend {
    JobStoreBackend::Postgres
}

fn default_database_max_connections() -> u32 {
    20
}

fn default_queue_backend() -> QueueBackend {
    QueueBackend::InProcess
}

fn default_generation_model() -> String {
    "@cf/runwayml/stable-diffusion-v1-5-img2img".to_string()
}

fn default_generation_prompt() -> String {
    "professional studio headshot, soft lighting, neutral background".to_string()
}

fn default_generation_timeout_secs() -> u64 {
    120
}

fn default_worker_pool_size() -> usize {
    4
}

fn default_status_poll_interval_ms() -> u64 {
    300
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

fn default_event_buffer_capacity() -> usize {
    1024
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.job_store == JobStoreBackend::Postgres && self.database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }
        if self.queue_backend == QueueBackend::Redis && self.redis_url.is_none() {
            return Err(ConfigError::Missing("REDIS_URL"));
        }
        if self.worker_pool_size == 0 {
            return Err(ConfigError::Invalid("WORKER_POOL_SIZE must be at least 1"));
        }
        if self.status_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "STATUS_POLL_INTERVAL_MS must be greater than 0",
            ));
        }
        Ok(())
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }
}
