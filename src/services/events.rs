//! In-process fan-out of job status snapshots.
//!
//! [`JobEvents`] wraps a `tokio::sync::broadcast` channel. It is created once
//! in `main`, shared as `Arc<JobEvents>`, and closed on shutdown so open
//! streams end. Subscribers only see snapshots published after they
//! subscribe; there is no replay.

use futures::Stream;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::models::job::JobStatusSnapshot;

/// Default per-subscriber buffer.
pub const DEFAULT_CAPACITY: usize = 1024;

pub struct JobEvents {
    sender: broadcast::Sender<JobStatusSnapshot>,
    closed: watch::Sender<bool>,
}

impl JobEvents {
    /// Create a hub whose subscribers may fall at most `capacity` snapshots
    /// behind. A slower subscriber loses the oldest snapshots instead of
    /// blocking publishers.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        let (closed, _) = watch::channel(false);
        Self { sender, closed }
    }

    /// Deliver a snapshot to every current subscriber. Never blocks.
    pub fn publish(&self, snapshot: JobStatusSnapshot) {
        // A send error only means nobody is subscribed.
        let _ = self.sender.send(snapshot);
    }

    /// Live snapshots for one customer, in publish order.
    ///
    /// Each call opens an independent subscription that ends when the
    /// returned stream is dropped or the hub is closed.
    pub fn subscribe_by_customer(
        &self,
        customer_id: &str,
    ) -> impl Stream<Item = JobStatusSnapshot> + Send + 'static {
        let customer_id = customer_id.to_string();
        let mut closed = self.closed.subscribe();
        let stop = async move {
            let _ = closed.wait_for(|closed| *closed).await;
        };

        let snapshots =
            BroadcastStream::new(self.sender.subscribe()).filter_map(move |result| match result {
                Ok(snapshot) if snapshot.customer_id == customer_id => Some(snapshot),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        customer_id = %customer_id,
                        skipped,
                        "Status subscriber lagged, snapshots dropped"
                    );
                    None
                }
            });

        futures::StreamExt::take_until(snapshots, stop)
    }

    /// End every open subscription, now and for later subscribers.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobEvents {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
