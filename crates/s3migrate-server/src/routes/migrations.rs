//! Migration Routes
//!
//! Handlers for submitting a migration, polling its status, and
//! requesting cancellation. All three simply forward to the
//! `Orchestrator`; this crate owns no migration state of its own.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use s3migrate_core::MigrationRequest;

use crate::state::AppState;
use crate::types::{
    error_codes, ApiError, CancelResponse, SubmitMigrationRequest, SubmitMigrationResponse,
    TaskStatusResponse,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(submit_migration))
        .route("/:task_id", get(get_status))
        .route("/:task_id/cancel", post(cancel_migration))
}

async fn submit_migration(
    State(state): State<AppState>,
    Json(request): Json<SubmitMigrationRequest>,
) -> Result<Json<SubmitMigrationResponse>, (StatusCode, Json<ApiError>)> {
    let request: MigrationRequest = request.into();

    let task_id = state
        .orchestrator
        .submit(request, None)
        .await
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(ApiError::new(error_codes::INVALID_REQUEST, e.to_string())),
            )
        })?;

    Ok(Json(SubmitMigrationResponse { task_id }))
}

async fn get_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, (StatusCode, Json<ApiError>)> {
    let task = state
        .orchestrator
        .status(&task_id)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new(error_codes::INTERNAL_ERROR, e.to_string())),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ApiError::new(error_codes::NOT_FOUND, "task not found")),
            )
        })?;

    Ok(Json(task.into()))
}

async fn cancel_migration(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<CancelResponse>, (StatusCode, Json<ApiError>)> {
    let cancelled = state.orchestrator.cancel(&task_id).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::new(error_codes::INTERNAL_ERROR, e.to_string())),
        )
    })?;

    Ok(Json(CancelResponse { cancelled }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ServerConfig;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn status_for_unknown_task_returns_404() {
        let state = AppState::new(ServerConfig::default());
        let app = routes().with_state(state);

        let response = app
            .oneshot(
                Request::get("/does-not-exist")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn submit_with_malformed_body_returns_422() {
        let state = AppState::new(ServerConfig::default());
        let app = routes().with_state(state);

        let response = app
            .oneshot(
                Request::post("/")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}
