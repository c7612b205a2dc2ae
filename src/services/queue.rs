use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

const QUEUE_KEY: &str = "profile_photo:jobs";
const PROCESSING_KEY: &str = "profile_photo:processing";

/// Outcome of asking a queue for work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dequeued {
    Job(Uuid),
    /// Nothing queued right now; try again later.
    Empty,
    /// The queue was closed and has nothing left to hand out.
    Closed,
}

/// Scheduling layer between submission and the worker pool.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job_id: Uuid) -> Result<(), QueueError>;

    async fn dequeue(&self) -> Result<Dequeued, QueueError>;

    /// Acknowledge a job handed out by `dequeue`.
    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError>;

    /// Refuse new work. Already queued ids are still handed out where the
    /// backend holds them in memory.
    fn close(&self);

    async fn depth(&self) -> Result<u64, QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;
}

/// Unbounded in-process queue.
pub struct InProcessQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<Uuid>>>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Uuid>>,
    depth: AtomicU64,
}

impl InProcessQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
            depth: AtomicU64::new(0),
        }
    }
}

impl Default for InProcessQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InProcessQueue {
    async fn enqueue(&self, job_id: Uuid) -> Result<(), QueueError> {
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        let sender = sender.as_ref().ok_or(QueueError::Closed)?;
        // Counted before sending so a fast consumer never takes depth below zero.
        self.depth.fetch_add(1, Ordering::SeqCst);
        if sender.send(job_id).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    async fn dequeue(&self) -> Result<Dequeued, QueueError> {
        let mut receiver = self.receiver.lock().await;
        // Returns None only once the sender is dropped and the buffer is drained.
        match receiver.recv().await {
            Some(job_id) => {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                Ok(Dequeued::Job(job_id))
            }
            None => Ok(Dequeued::Closed),
        }
    }

    async fn complete(&self, _job_id: Uuid) -> Result<(), QueueError> {
        Ok(())
    }

    fn close(&self) {
        self.sender.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        Ok(self.depth.load(Ordering::SeqCst))
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

/// Job payload serialized into Redis.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueuedJob {
    pub job_id: Uuid,
}

/// Redis-backed job queue.
///
/// Dequeued ids move to a processing list until `complete`, so a crash
/// mid-job leaves the id recoverable; processing starts with a store claim,
/// which makes a redelivered id harmless.
pub struct RedisQueue {
    client: redis::Client,
    closed: AtomicBool,
}

impl RedisQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self {
            client,
            closed: AtomicBool::new(false),
        })
    }

    fn payload(job_id: Uuid) -> Result<String, QueueError> {
        serde_json::to_string(&QueuedJob { job_id }).map_err(QueueError::Serialize)
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, job_id: Uuid) -> Result<(), QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let payload = Self::payload(job_id)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn dequeue(&self) -> Result<Dequeued, QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(Dequeued::Closed);
        }
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let result: Option<String> = conn
            .rpoplpush(QUEUE_KEY, PROCESSING_KEY)
            .await
            .map_err(QueueError::Redis)?;

        match result {
            Some(payload) => {
                let job: QueuedJob = serde_json::from_str(&payload).map_err(QueueError::Serialize)?;
                Ok(Dequeued::Job(job.job_id))
            }
            None => Ok(Dequeued::Empty),
        }
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let payload = Self::payload(job_id)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let depth: u64 = conn.llen(QUEUE_KEY).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Job queue is closed")]
    Closed,
}
