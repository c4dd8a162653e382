//! HTTP Request and Response Types
//!
//! JSON schema for the migration submission/status/cancel surface.

use serde::{Deserialize, Serialize};

use s3migrate_core::config::Credentials;
use s3migrate_core::task::{Task, TaskStatus};
use s3migrate_core::MigrationRequest;

/// Request body for `POST /api/v1/migrations`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitMigrationRequest {
    pub source_bucket: String,
    #[serde(default)]
    pub dest_bucket: Option<String>,
    #[serde(default)]
    pub source_prefix: String,
    #[serde(default)]
    pub dest_prefix: String,
    pub source_credentials: Credentials,
    #[serde(default)]
    pub dest_credentials: Option<Credentials>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub incremental: bool,
}

impl From<SubmitMigrationRequest> for MigrationRequest {
    fn from(req: SubmitMigrationRequest) -> Self {
        use s3migrate_core::delta_planner::MigrationMode;

        MigrationRequest {
            source_bucket: req.source_bucket,
            dest_bucket: req.dest_bucket,
            source_prefix: req.source_prefix,
            dest_prefix: req.dest_prefix,
            source_credentials: req.source_credentials,
            dest_credentials: req.dest_credentials,
            dry_run: req.dry_run,
            migration_mode: if req.incremental {
                MigrationMode::Incremental
            } else {
                MigrationMode::FullRewrite
            },
            timeout: None,
        }
    }
}

/// Response from `POST /api/v1/migrations`.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitMigrationResponse {
    pub task_id: String,
}

/// Response from `GET /api/v1/migrations/:task_id`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatusResponse {
    pub id: String,
    pub status: TaskStatus,
    pub progress_percent: f64,
    pub total_objects: u64,
    pub copied: u64,
    pub failed: u64,
    pub verified: u64,
    pub current_speed_mb_s: f64,
    pub eta: Option<String>,
    pub errors: Vec<String>,
}

impl From<Task> for TaskStatusResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            status: task.status,
            progress_percent: task.counters.progress(),
            total_objects: task.counters.total_objects,
            copied: task.counters.copied,
            failed: task.counters.failed,
            verified: task.counters.verified,
            current_speed_mb_s: task.current_speed_mb_s,
            eta: task.eta,
            errors: task.errors,
        }
    }
}

/// Response from `POST /api/v1/migrations/:task_id/cancel`.
#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// Standard error body returned for non-2xx responses.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

pub mod error_codes {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

#[cfg(test)]
mod tests {
    use super::*;
    use s3migrate_core::delta_planner::MigrationMode;

    #[test]
    fn incremental_flag_maps_to_migration_mode() {
        let req = SubmitMigrationRequest {
            source_bucket: "src".to_string(),
            dest_bucket: None,
            source_prefix: String::new(),
            dest_prefix: String::new(),
            source_credentials: Credentials::ambient("us-east-1"),
            dest_credentials: None,
            dry_run: false,
            incremental: true,
        };
        let request: MigrationRequest = req.into();
        assert_eq!(request.migration_mode, MigrationMode::Incremental);
    }
}
