//! Shared fakes and app wiring for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

use profile_photo_jobs::app_state::AppState;
use profile_photo_jobs::models::job::{JobStatus, JobStatusSnapshot, PhotoJob};
use profile_photo_jobs::models::photo::{GeneratedPhoto, ProfilePhoto};
use profile_photo_jobs::routes;
use profile_photo_jobs::services::events::JobEvents;
use profile_photo_jobs::services::generation::{GenerationError, PhotoGenerator};
use profile_photo_jobs::services::job_store::{InMemoryJobStore, JobStore, StoreError};
use profile_photo_jobs::services::photo_repository::InMemoryPhotoRepository;
use profile_photo_jobs::services::processor::PhotoJobProcessor;
use profile_photo_jobs::services::queue::InProcessQueue;
use profile_photo_jobs::services::storage::{
    generated_key, original_key, PhotoStorage, StorageError,
};
use profile_photo_jobs::services::submission::PhotoJobService;
use profile_photo_jobs::services::webhook::StatusNotifier;
use profile_photo_jobs::services::worker_pool::WorkerPool;

pub const CDN: &str = "https://cdn.test";

/// How the fake generator behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorMode {
    Succeed,
    Fail,
    Panic,
}

pub struct FakeGenerator {
    mode: GeneratorMode,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeGenerator {
    pub fn new(mode: GeneratorMode) -> Self {
        Self {
            mode,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PhotoGenerator for FakeGenerator {
    async fn generate(&self, photo: &ProfilePhoto) -> Result<GeneratedPhoto, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.mode {
            GeneratorMode::Succeed => {
                let bytes = tokio::fs::read(&photo.original_path).await?;
                Ok(GeneratedPhoto {
                    bytes,
                    content_type: "image/png".to_string(),
                })
            }
            GeneratorMode::Fail => Err(GenerationError::Status {
                status: 500,
                body: "model unavailable".to_string(),
            }),
            GeneratorMode::Panic => panic!("generator blew up"),
        }
    }
}

/// Storage that only computes URLs; optionally refuses the generated image.
pub struct FakeStorage {
    fail_generated: bool,
}

impl FakeStorage {
    pub fn new() -> Self {
        Self {
            fail_generated: false,
        }
    }

    pub fn failing_generated() -> Self {
        Self {
            fail_generated: true,
        }
    }
}

#[async_trait]
impl PhotoStorage for FakeStorage {
    async fn store_original(
        &self,
        customer_id: &str,
        photo: &ProfilePhoto,
    ) -> Result<String, StorageError> {
        // The original must still be on disk while the job runs.
        tokio::fs::metadata(&photo.original_path).await?;
        Ok(format!("{CDN}/{}", original_key(customer_id, photo)))
    }

    async fn store_generated(
        &self,
        customer_id: &str,
        photo: &ProfilePhoto,
        generated: &GeneratedPhoto,
    ) -> Result<String, StorageError> {
        let key = generated_key(customer_id, photo, generated);
        if self.fail_generated {
            return Err(StorageError::Rejected { key, status: 503 });
        }
        Ok(format!("{CDN}/{key}"))
    }
}

/// Notifier that records every call instead of sending it.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<(Option<String>, JobStatusSnapshot)>>,
}

impl RecordingNotifier {
    pub fn calls(&self) -> Vec<(Option<String>, JobStatusSnapshot)> {
        self.calls.lock().unwrap().clone()
    }
}

impl StatusNotifier for RecordingNotifier {
    fn notify(&self, callback_url: Option<&str>, snapshot: &JobStatusSnapshot) {
        self.calls
            .lock()
            .unwrap()
            .push((callback_url.map(str::to_string), snapshot.clone()));
    }
}

/// Job store whose `find_by_id` errors on the listed (1-based) calls and
/// otherwise delegates.
pub struct FlakyJobStore {
    inner: Arc<InMemoryJobStore>,
    failing_finds: Vec<usize>,
    finds: AtomicUsize,
}

impl FlakyJobStore {
    pub fn new(inner: Arc<InMemoryJobStore>, failing_finds: &[usize]) -> Self {
        Self {
            inner,
            failing_finds: failing_finds.to_vec(),
            finds: AtomicUsize::new(0),
        }
    }

    pub fn finds(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobStore for FlakyJobStore {
    async fn create(
        &self,
        customer_id: &str,
        photo: &ProfilePhoto,
        callback_url: Option<&str>,
    ) -> Result<PhotoJob, StoreError> {
        self.inner.create(customer_id, photo, callback_url).await
    }

    async fn find_by_id(&self, job_id: Uuid) -> Result<Option<PhotoJob>, StoreError> {
        let call = self.finds.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_finds.contains(&call) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.find_by_id(job_id).await
    }

    async fn claim(&self, job_id: Uuid) -> Result<bool, StoreError> {
        self.inner.claim(job_id).await
    }

    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.inner.update_status(job_id, status, error).await
    }

    async fn update_result(
        &self,
        job_id: Uuid,
        original_url: &str,
        generated_url: &str,
    ) -> Result<(), StoreError> {
        self.inner.update_result(job_id, original_url, generated_url).await
    }

    async fn list_pending(&self, limit: usize) -> Result<Vec<PhotoJob>, StoreError> {
        self.inner.list_pending(limit).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.inner.health_check().await
    }
}

/// Every component wired with in-memory backends.
pub struct TestApp {
    pub jobs: Arc<InMemoryJobStore>,
    pub photos: Arc<InMemoryPhotoRepository>,
    pub events: Arc<JobEvents>,
    pub queue: Arc<InProcessQueue>,
    pub generator: Arc<FakeGenerator>,
    pub notifier: Arc<RecordingNotifier>,
    pub processor: Arc<PhotoJobProcessor>,
    pub submissions: PhotoJobService,
    pub upload_dir: TempDir,
}

impl TestApp {
    pub fn new(generator: FakeGenerator, storage: FakeStorage) -> Self {
        let jobs = Arc::new(InMemoryJobStore::new());
        let photos = Arc::new(InMemoryPhotoRepository::new());
        let events = Arc::new(JobEvents::default());
        let queue = Arc::new(InProcessQueue::new());
        let generator = Arc::new(generator);
        let notifier = Arc::new(RecordingNotifier::default());

        let processor = Arc::new(PhotoJobProcessor::new(
            jobs.clone(),
            photos.clone(),
            generator.clone(),
            Arc::new(storage),
            events.clone(),
            notifier.clone(),
        ));
        let submissions = PhotoJobService::new(jobs.clone(), events.clone(), queue.clone());

        Self {
            jobs,
            photos,
            events,
            queue,
            generator,
            notifier,
            processor,
            submissions,
            upload_dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(FakeGenerator::new(GeneratorMode::Succeed), FakeStorage::new())
    }

    /// A processor sharing this app's collaborators but reading jobs
    /// through `jobs`.
    pub fn processor_with_store(&self, jobs: Arc<dyn JobStore>) -> Arc<PhotoJobProcessor> {
        Arc::new(PhotoJobProcessor::new(
            jobs,
            self.photos.clone(),
            self.generator.clone(),
            Arc::new(FakeStorage::new()),
            self.events.clone(),
            self.notifier.clone(),
        ))
    }

    pub async fn photo(&self, customer_id: &str) -> ProfilePhoto {
        ProfilePhoto::materialize(
            self.upload_dir.path(),
            customer_id,
            "me.png",
            "image/png",
            &png_bytes(),
        )
        .await
        .unwrap()
    }

    pub async fn job(&self, job_id: Uuid) -> PhotoJob {
        self.jobs.find_by_id(job_id).await.unwrap().unwrap()
    }

    pub fn start_pool(&self, size: usize) -> WorkerPool {
        WorkerPool::start(
            size,
            self.queue.clone(),
            self.processor.clone(),
            Duration::from_millis(20),
        )
    }

    pub fn state(&self) -> AppState {
        AppState::new(
            self.jobs.clone(),
            self.queue.clone(),
            self.events.clone(),
            Duration::from_millis(20),
            self.upload_dir.path().to_path_buf(),
        )
    }

    /// Serve the router on an ephemeral port and return its base URL.
    pub async fn serve(&self) -> String {
        let prometheus = Arc::new(PrometheusBuilder::new().build_recorder().handle());
        let router = routes::router(self.state(), prometheus, 10 * 1024 * 1024);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// Poll the store until the job is terminal.
    pub async fn wait_terminal(&self, job_id: Uuid) -> PhotoJob {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let job = self.job(job_id).await;
                if job.status.is_terminal() {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("job did not reach a terminal state")
    }
}

/// A small but real PNG.
pub fn png_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbImage::new(4, 4)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}
