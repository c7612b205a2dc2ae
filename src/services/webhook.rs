//! Best-effort webhook delivery of job status snapshots.
//!
//! [`WebhookNotifier`] POSTs the JSON snapshot to the caller-supplied URL on
//! a spawned task. There is one attempt per call: no retry, no ordering
//! between calls, and failures only show up in logs and the
//! `webhook_deliveries_failed_total` counter.

use std::time::Duration;

use crate::models::job::JobStatusSnapshot;

/// Default HTTP timeout for a single delivery.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Receives job status changes for an optional callback URL.
pub trait StatusNotifier: Send + Sync {
    /// Hand off a snapshot. Must return without waiting for delivery.
    fn notify(&self, callback_url: Option<&str>, snapshot: &JobStatusSnapshot);
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// POST one snapshot and check the response status.
    pub async fn deliver(&self, url: &str, snapshot: &JobStatusSnapshot) -> Result<(), WebhookError> {
        // `.json` sets `Content-Type: application/json`.
        let response = self.client.post(url).json(snapshot).send().await?;
        if !response.status().is_success() {
            return Err(WebhookError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

impl StatusNotifier for WebhookNotifier {
    fn notify(&self, callback_url: Option<&str>, snapshot: &JobStatusSnapshot) {
        let Some(url) = callback_url.map(str::trim).filter(|u| !u.is_empty()) else {
            return;
        };

        let notifier = self.clone();
        let url = url.to_string();
        let snapshot = snapshot.clone();

        tokio::spawn(async move {
            match notifier.deliver(&url, &snapshot).await {
                Ok(()) => {
                    tracing::debug!(
                        job_id = %snapshot.job_id,
                        status = %snapshot.status,
                        url = %url,
                        "Webhook delivered"
                    );
                }
                Err(e) => {
                    metrics::counter!("webhook_deliveries_failed_total").increment(1);
                    tracing::warn!(
                        job_id = %snapshot.job_id,
                        url = %url,
                        error = %e,
                        "Failed to notify callback"
                    );
                }
            }
        });
    }
}
