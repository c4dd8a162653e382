//! HTTP Route Handlers
//!
//! Organized by resource: migrations, health, metrics.

pub mod health;
pub mod metrics;
pub mod migrations;

use axum::Router;

use crate::state::AppState;

/// Create the complete API router.
pub fn api_router(state: AppState) -> Router {
    let api_routes = Router::new().nest("/migrations", migrations::routes());

    let health = health::health_routes();
    let metrics = metrics::metrics_routes();

    Router::new()
        .nest("/api/v1", api_routes)
        .merge(health)
        .merge(metrics)
        .with_state(state)
}
