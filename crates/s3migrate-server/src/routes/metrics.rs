//! Prometheus Metrics Endpoint
//!
//! Exposes engine metrics in Prometheus text format at `/metrics` when
//! the `metrics` feature is enabled.

#[cfg(feature = "metrics")]
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};

use crate::state::AppState;

#[cfg(feature = "metrics")]
pub fn metrics_routes() -> Router<AppState> {
    Router::new().route("/metrics", get(prometheus_metrics))
}

#[cfg(feature = "metrics")]
async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(metrics) => match metrics.encode() {
            Ok(output) => (
                StatusCode::OK,
                [("Content-Type", "text/plain; version=0.0.4; charset=utf-8")],
                output,
            ),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("Content-Type", "text/plain; charset=utf-8")],
                format!("failed to encode metrics: {e}"),
            ),
        },
        None => (
            StatusCode::NOT_FOUND,
            [("Content-Type", "text/plain; charset=utf-8")],
            "metrics not enabled".to_string(),
        ),
    }
}

#[cfg(not(feature = "metrics"))]
pub fn metrics_routes() -> axum::Router<AppState> {
    use axum::{http::StatusCode, routing::get, Router};

    Router::new().route(
        "/metrics",
        get(|| async {
            (
                StatusCode::NOT_FOUND,
                "metrics feature not enabled; rebuild with --features metrics",
            )
        }),
    )
}
