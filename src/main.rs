use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use profile_photo_jobs::app_state::AppState;
use profile_photo_jobs::config::{AppConfig, JobStoreBackend, QueueBackend};
use profile_photo_jobs::db;
use profile_photo_jobs::routes;
use profile_photo_jobs::services::{
    events::JobEvents,
    generation::WorkersAiClient,
    job_store::{InMemoryJobStore, JobStore, PgJobStore},
    photo_repository::{InMemoryPhotoRepository, PgPhotoRepository, PhotoRepository},
    processor::PhotoJobProcessor,
    queue::{InProcessQueue, JobQueue, RedisQueue},
    storage::R2Client,
    webhook::WebhookNotifier,
    worker_pool::{self, WorkerPool, DEFAULT_IDLE_BACKOFF},
};

/// Upper bound on jobs re-enqueued at startup.
const RECOVERY_LIMIT: usize = 10_000;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing profile-photo-jobs server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("photo_jobs_submitted_total", "Total photo jobs submitted");
    metrics::describe_counter!("photo_jobs_completed_total", "Total photo jobs completed");
    metrics::describe_counter!("photo_jobs_failed_total", "Total photo jobs that failed");
    metrics::describe_histogram!(
        "photo_job_processing_seconds",
        "Time to process a profile photo job"
    );
    metrics::describe_counter!(
        "webhook_deliveries_failed_total",
        "Webhook deliveries that failed or were rejected"
    );
    metrics::describe_gauge!(
        "status_stream_subscribers",
        "Open status stream subscriptions"
    );
    metrics::describe_gauge!(
        "photo_job_queue_depth",
        "Current number of jobs waiting in the queue"
    );

    let (jobs, photos): (Arc<dyn JobStore>, Arc<dyn PhotoRepository>) = match config.job_store {
        JobStoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .expect("DATABASE_URL is required for the postgres job store");

            tracing::info!("Connecting to PostgreSQL database");
            let db_pool = db::init_pool(database_url, config.database_max_connections)
                .await
                .expect("Failed to connect to database");

            tracing::info!("Running database migrations");
            db::run_migrations(&db_pool)
                .await
                .expect("Failed to run database migrations");

            (
                Arc::new(PgJobStore::new(db_pool.clone())),
                Arc::new(PgPhotoRepository::new(db_pool)),
            )
        }
        JobStoreBackend::Memory => {
            tracing::warn!("Using in-memory job store, jobs are lost on restart");
            (
                Arc::new(InMemoryJobStore::new()),
                Arc::new(InMemoryPhotoRepository::new()),
            )
        }
    };

    let queue: Arc<dyn JobQueue> = match config.queue_backend {
        QueueBackend::InProcess => Arc::new(InProcessQueue::new()),
        QueueBackend::Redis => {
            let redis_url = config
                .redis_url
                .as_deref()
                .expect("REDIS_URL is required for the redis queue");
            tracing::info!("Connecting to Redis job queue");
            Arc::new(RedisQueue::new(redis_url).expect("Failed to initialize job queue"))
        }
    };

    let events = Arc::new(JobEvents::new(config.event_buffer_capacity));
    let shutdown_events = events.clone();

    // Initialize R2 storage client
    tracing::info!("Initializing R2 storage client");
    let storage = R2Client::new(
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
        &config.r2_public_url,
    )
    .expect("Failed to initialize R2 client");

    // Initialize Workers AI client
    tracing::info!(model = %config.generation_model, "Initializing Cloudflare Workers AI client");
    let generator = WorkersAiClient::new(
        &config.cf_account_id,
        &config.cf_api_token,
        &config.generation_model,
        &config.generation_prompt,
        config.generation_timeout(),
    )
    .expect("Failed to initialize Workers AI client");

    let notifier =
        WebhookNotifier::new(config.webhook_timeout()).expect("Failed to initialize webhook client");

    let processor = Arc::new(PhotoJobProcessor::new(
        jobs.clone(),
        photos,
        Arc::new(generator),
        Arc::new(storage),
        events.clone(),
        Arc::new(notifier),
    ));

    let pool = WorkerPool::start(
        config.worker_pool_size,
        queue.clone(),
        processor,
        DEFAULT_IDLE_BACKOFF,
    );

    if let Err(e) = worker_pool::recover_pending(jobs.as_ref(), queue.as_ref(), RECOVERY_LIMIT).await {
        tracing::error!(error = %e, "Failed to re-enqueue pending jobs");
    }

    let upload_dir = config.upload_dir();
    tracing::info!(upload_dir = %upload_dir.display(), "Uploads are staged locally");

    // Create shared application state
    let state = AppState::new(
        jobs,
        queue,
        events,
        config.status_poll_interval(),
        upload_dir,
    );

    let app = routes::router(state, prometheus_handle, config.max_upload_bytes);

    tracing::info!("Starting profile-photo-jobs on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open status streams would otherwise hold the server open.
            shutdown_events.close();
        })
        .await
        .expect("Server error");

    tracing::info!("Server stopped, draining worker pool");
    pool.shutdown().await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
