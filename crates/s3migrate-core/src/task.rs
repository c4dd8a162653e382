//! Data model: the `Task` row shape, job/outcome types flowing
//! between the planner and the engine, and the migration request the
//! orchestrator accepts from its caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Credentials;
use crate::delta_planner::MigrationMode;
use crate::integrity::IntegritySummary;

/// Task lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Running counters for a task, mutated only by the owning engine.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct TaskCounters {
    pub total_objects: u64,
    pub total_bytes: u64,
    pub copied: u64,
    pub copied_bytes: u64,
    pub failed: u64,
    pub verified: u64,
}

impl TaskCounters {
    /// `progress ≈ 100 * copied / total_objects`, saturating at 100
    /// and defined as 0 when no objects have been enumerated yet.
    pub fn progress(&self) -> f64 {
        if self.total_objects == 0 {
            0.0
        } else {
            (100.0 * self.copied as f64 / self.total_objects as f64).min(100.0)
        }
    }
}

/// One migration task row. The owning execution engine is the only
/// writer; the orchestrator publishes read-only snapshots of this type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub counters: TaskCounters,
    pub current_speed_mb_s: f64,
    pub eta: Option<String>,
    pub errors: Vec<String>,
    pub request: MigrationRequest,
    pub mode: MigrationMode,
    pub dry_run: bool,
    pub integrity_summary: IntegritySummary,
}

impl Task {
    pub fn pending(id: String, request: MigrationRequest) -> Self {
        let mode = request.migration_mode;
        let dry_run = request.dry_run;
        Self {
            id,
            status: TaskStatus::Pending,
            started_at: None,
            ended_at: None,
            counters: TaskCounters::default(),
            current_speed_mb_s: 0.0,
            eta: None,
            errors: Vec::new(),
            request,
            mode,
            dry_run,
            integrity_summary: IntegritySummary::default(),
        }
    }
}

/// A request to migrate one bucket (or all buckets, when `source_bucket`
/// is empty —  "all-buckets mode").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MigrationRequest {
    pub source_bucket: String,
    pub dest_bucket: Option<String>,
    pub source_prefix: String,
    pub dest_prefix: String,
    pub source_credentials: Credentials,
    pub dest_credentials: Option<Credentials>,
    pub dry_run: bool,
    pub migration_mode: MigrationMode,
    pub timeout: Option<std::time::Duration>,
}

impl MigrationRequest {
    /// Empty `source_bucket` means "all buckets"; in that mode the
    /// destination bucket name is derived per-bucket rather than from
    /// this field.
    pub fn is_all_buckets(&self) -> bool {
        self.source_bucket.is_empty()
    }

    /// Destination bucket, defaulting to the source bucket name.
    pub fn resolved_dest_bucket(&self) -> String {
        self.dest_bucket
            .clone()
            .unwrap_or_else(|| self.source_bucket.clone())
    }

    /// A request with a cross-account destination (separate destination
    /// credentials) must stream bytes through the engine rather than use
    /// a server-side copy.
    pub fn is_cross_account(&self) -> bool {
        self.dest_credentials.is_some()
    }

    /// Basic input validation: surfaced at task creation,
    /// before a task ever reaches `running`.
    pub fn validate(&self) -> Result<(), String> {
        if self.source_bucket.is_empty() && self.dest_bucket.is_some() {
            return Err("all-buckets mode does not accept an explicit dest_bucket".to_string());
        }
        Ok(())
    }
}

/// Default concurrency cap for all-buckets fan-out.
pub const ALL_BUCKETS_CONCURRENCY: usize = 3;

/// One object discovered by the lister or destined for copy by the
/// planner. Re-exported here for callers that only need the data
/// model, not the listing machinery.
pub use crate::lister::ObjectRef;

/// One unit of work handed to a single worker; never revisited once
/// consumed from the job queue.
#[derive(Clone, Debug)]
pub struct CopyJob {
    pub source_bucket: String,
    pub source_key: String,
    pub dest_bucket: String,
    pub dest_key: String,
    pub size: u64,
}

/// The result of running exactly one `CopyJob` to completion.
#[derive(Clone, Debug)]
pub enum CopyOutcome {
    Succeeded {
        bytes: u64,
        /// Whether the post-copy integrity check passed; `None` when no
        /// integrity check could be attempted at all (distinct from a
        /// failed check, which is `Some(false)`).
        integrity_valid: Option<bool>,
    },
    Failed { error: String },
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(source_bucket: &str, dest_bucket: Option<&str>) -> MigrationRequest {
        MigrationRequest {
            source_bucket: source_bucket.to_string(),
            dest_bucket: dest_bucket.map(str::to_string),
            source_prefix: String::new(),
            dest_prefix: String::new(),
            source_credentials: Credentials::ambient("us-east-1"),
            dest_credentials: None,
            dry_run: false,
            migration_mode: MigrationMode::FullRewrite,
            timeout: None,
        }
    }

    #[test]
    fn empty_source_bucket_is_all_buckets_mode() {
        assert!(request("", None).is_all_buckets());
        assert!(!request("my-bucket", None).is_all_buckets());
    }

    #[test]
    fn dest_bucket_defaults_to_source() {
        let r = request("my-bucket", None);
        assert_eq!(r.resolved_dest_bucket(), "my-bucket");
        let r = request("my-bucket", Some("other-bucket"));
        assert_eq!(r.resolved_dest_bucket(), "other-bucket");
    }

    #[test]
    fn all_buckets_with_explicit_dest_is_rejected() {
        let r = request("", Some("other-bucket"));
        assert!(r.validate().is_err());
    }

    #[test]
    fn progress_is_zero_with_no_objects() {
        let counters = TaskCounters::default();
        assert_eq!(counters.progress(), 0.0);
    }

    #[test]
    fn progress_tracks_copied_over_total() {
        let counters = TaskCounters {
            total_objects: 4,
            copied: 1,
            ..Default::default()
        };
        assert!((counters.progress() - 25.0).abs() < f64::EPSILON);
    }
}
