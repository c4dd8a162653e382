//! Health Check Routes
//!
//! - `/health` - liveness: is the process up?
//! - `/` - basic service info

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
}

async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: "s3migrate-server",
        version: env!("CARGO_PKG_VERSION"),
        description: "HTTP surface for the S3-compatible migration engine",
    })
}

#[derive(Serialize)]
struct ServiceInfo {
    name: &'static str,
    version: &'static str,
    description: &'static str,
}

async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy",
        timestamp: chrono::Utc::now(),
    })
}

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check().await;
        assert_eq!(response.status, "healthy");
    }
}
