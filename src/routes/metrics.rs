use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::app_state::AppState;

/// State for the scrape endpoint.
#[derive(Clone)]
pub struct MetricsState {
    pub handle: Arc<PrometheusHandle>,
    pub app: AppState,
}

/// Prometheus metrics scrape endpoint.
/// Gauges derived from live state are refreshed before rendering.
pub async fn prometheus_metrics(State(state): State<MetricsState>) -> impl IntoResponse {
    metrics::gauge!("status_stream_subscribers").set(state.app.events.subscriber_count() as f64);
    if let Ok(depth) = state.app.queue.depth().await {
        metrics::gauge!("photo_job_queue_depth").set(depth as f64);
    }
    state.handle.render()
}
