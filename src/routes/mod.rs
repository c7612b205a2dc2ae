pub mod health;
pub mod metrics;
pub mod photos;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use self::metrics::MetricsState;

/// Build the HTTP API.
pub fn router(state: AppState, prometheus: Arc<PrometheusHandle>, max_upload_bytes: usize) -> Router {
    let metrics_state = MetricsState {
        handle: prometheus,
        app: state.clone(),
    };

    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/v1/customers/{customer_id}/photos",
            post(photos::submit_photo),
        )
        .route(
            "/api/v1/customers/{customer_id}/photos/stream",
            get(photos::stream_photo_status),
        )
        .route(
            "/api/v1/customers/{customer_id}/photos/{job_id}/status",
            get(photos::get_photo_status),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state(metrics_state),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        // Multipart's own 2 MB default is replaced by the configured limit.
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
}
