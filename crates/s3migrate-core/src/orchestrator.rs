//! Task Orchestrator: accepts a migration request, creates a task
//! row, launches the execution engine in the background, and exposes
//! read-only status snapshots plus cancellation — never blocking the
//! caller for the duration of the migration.
//!
//! `TaskStore` is the same kind of persistence port as [`IntegrityStore`]
//! (`crate::integrity`): the relational `migration_tasks` table is an
//! external collaborator out of scope for this crate; this module
//! ships only the trait and an in-memory reference implementation.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::client_pool::ClientPool;
use crate::config::ClientPoolConfig;
use crate::engine::{Engine, ProgressCallback};
use crate::error::{MigrateError, Result};
use crate::integrity::IntegrityStore;
use crate::task::{MigrationRequest, Task, TaskStatus};

/// Append/update port for task rows.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: Task) -> Result<()>;
    async fn update(&self, task: Task) -> Result<()>;
    async fn get(&self, task_id: &str) -> Result<Option<Task>>;
}

/// In-memory reference `TaskStore`. A production deployment swaps this
/// for a Postgres-backed implementation against `migration_tasks`;
/// out of scope for this crate.
#[derive(Default)]
pub struct InMemoryTaskStore {
    rows: RwLock<HashMap<String, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: Task) -> Result<()> {
        self.rows.write().await.insert(task.id.clone(), task);
        Ok(())
    }

    async fn update(&self, task: Task) -> Result<()> {
        self.rows.write().await.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Option<Task>> {
        Ok(self.rows.read().await.get(task_id).cloned())
    }
}

/// Drives one or more [`Engine`] runs on behalf of a caller, publishing
/// task rows to a [`TaskStore`] and never blocking on migration progress.
pub struct Orchestrator {
    task_store: Arc<dyn TaskStore>,
    integrity_store: Arc<dyn IntegrityStore>,
    engines: RwLock<HashMap<String, Arc<Engine>>>,
}

impl Orchestrator {
    pub fn new(task_store: Arc<dyn TaskStore>, integrity_store: Arc<dyn IntegrityStore>) -> Self {
        Self {
            task_store,
            integrity_store,
            engines: RwLock::new(HashMap::new()),
        }
    }

    /// Accept a request, create the task id + row, and launch the engine
    /// in the background. Returns immediately with the task id.
    pub async fn submit(
        &self,
        request: MigrationRequest,
        progress: Option<ProgressCallback>,
    ) -> Result<String> {
        request
            .validate()
            .map_err(MigrateError::InvalidRequest)?;

        let task_id = Uuid::new_v4().to_string();
        let task = Task::pending(task_id.clone(), request.clone());
        self.task_store.insert(task).await?;

        if request.is_all_buckets() {
            self.spawn_all_buckets(task_id.clone(), request, progress).await?;
        } else {
            self.spawn_single_bucket(task_id.clone(), request, progress).await?;
        }

        Ok(task_id)
    }

    async fn spawn_single_bucket(
        &self,
        task_id: String,
        request: MigrationRequest,
        progress: Option<ProgressCallback>,
    ) -> Result<()> {
        let dest_bucket = request.resolved_dest_bucket();
        let engine = self.build_engine(&request).await?;
        self.engines.write().await.insert(task_id.clone(), Arc::clone(&engine));

        let task_store = Arc::clone(&self.task_store);
        let integrity_store = Arc::clone(&self.integrity_store);
        tokio::spawn(run_and_finalize(
            engine,
            task_id,
            request,
            dest_bucket,
            progress,
            task_store,
            integrity_store,
        ));
        Ok(())
    }

    /// Empty `source_bucket` fans out per-bucket migrations with a
    /// concurrency cap. Each sub-migration shares
    /// the task id's row for status purposes but runs its own engine.
    async fn spawn_all_buckets(
        &self,
        task_id: String,
        request: MigrationRequest,
        progress: Option<ProgressCallback>,
    ) -> Result<()> {
        use crate::task::ALL_BUCKETS_CONCURRENCY;

        let engine = self.build_engine(&request).await?;
        let bucket_names = self.list_all_buckets(&engine).await?;

        self.engines.write().await.insert(task_id.clone(), Arc::clone(&engine));

        let task_store = Arc::clone(&self.task_store);
        let integrity_store = Arc::clone(&self.integrity_store);
        tokio::spawn(async move {
            let semaphore = Arc::new(tokio::sync::Semaphore::new(ALL_BUCKETS_CONCURRENCY));
            let mut joins = tokio::task::JoinSet::new();
            let bucket_count = bucket_names.len();
            for bucket in bucket_names {
                let permit = Arc::clone(&semaphore);
                let mut per_bucket_request = request.clone();
                per_bucket_request.source_bucket = bucket.clone();
                per_bucket_request.dest_bucket = Some(bucket.clone());
                let engine = Arc::clone(&engine);
                let progress = progress.clone();
                joins.spawn(async move {
                    let _permit = permit.acquire_owned().await.ok();
                    let outcome = engine
                        .run(&bucket, &per_bucket_request, &bucket, progress)
                        .await;
                    (bucket, outcome)
                });
            }

            let mut summary = crate::integrity::IntegritySummary::default();
            let mut any_copied = false;
            let mut any_failed = false;
            while let Some(joined) = joins.join_next().await {
                let Ok((bucket, outcome)) = joined else { continue };
                if let Ok(bucket_summary) = integrity_store.summary(&bucket).await {
                    summary.verified += bucket_summary.verified;
                    summary.failed += bucket_summary.failed;
                }
                if let Ok(report) = outcome {
                    any_copied |= report.copied > 0;
                    any_failed |= report.failed > 0;
                }
            }

            if let Ok(Some(mut task)) = task_store.get(&task_id).await {
                task.integrity_summary = summary;
                task.status = if any_failed && !any_copied && bucket_count > 0 {
                    TaskStatus::Failed
                } else {
                    TaskStatus::Completed
                };
                task.ended_at = Some(Utc::now());
                let _ = task_store.update(task).await;
            }
        });
        Ok(())
    }

    /// Enumerate every bucket visible to the destination pool's credentials
    /// via `ListBuckets`, used to drive an all-buckets migration (an empty
    /// `source_bucket` in the request).
    async fn list_all_buckets(&self, engine: &Arc<Engine>) -> Result<Vec<String>> {
        engine.list_source_buckets().await
    }

    async fn build_engine(&self, request: &MigrationRequest) -> Result<Arc<Engine>> {
        let mut source_config = ClientPoolConfig::new(request.source_credentials.clone());
        if let Some(timeout) = request.timeout {
            source_config = source_config.request_timeout(timeout);
        }
        let source_pool = Arc::new(ClientPool::new(source_config).await?);

        let (dest_pool, has_separate_dest_credentials) = match &request.dest_credentials {
            Some(dest_credentials) => {
                let mut dest_config = ClientPoolConfig::new(dest_credentials.clone());
                if let Some(timeout) = request.timeout {
                    dest_config = dest_config.request_timeout(timeout);
                }
                (Arc::new(ClientPool::new(dest_config).await?), true)
            }
            None => (Arc::clone(&source_pool), false),
        };

        Ok(Arc::new(Engine::new(
            source_pool,
            dest_pool,
            has_separate_dest_credentials,
            Arc::clone(&self.integrity_store),
        )))
    }

    /// Read-only status snapshot; never blocks on migration progress.
    pub async fn status(&self, task_id: &str) -> Result<Option<Task>> {
        self.task_store.get(task_id).await
    }

    /// Set the engine's stop flag for `task_id`, if it is still running.
    pub async fn cancel(&self, task_id: &str) -> Result<bool> {
        let engines = self.engines.read().await;
        match engines.get(task_id) {
            Some(engine) => {
                engine.stop_flag().store(true, Ordering::Relaxed);
                info!(task_id, "cancellation requested");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Graceful shutdown: signal every in-flight engine's stop flag. Each
    /// engine's own pipeline drains its workers and still runs the
    /// verification pass before `run()` returns, so the caller need only
    /// await those task handles (already spawned by `submit`) draining on
    /// its own shutdown path; this stops new bytes moving immediately.
    pub async fn shutdown(&self) {
        let engines = self.engines.read().await;
        for (task_id, engine) in engines.iter() {
            engine.stop_flag().store(true, Ordering::Relaxed);
            info!(task_id, "stopping engine for graceful shutdown");
        }
    }
}

async fn run_and_finalize(
    engine: Arc<Engine>,
    task_id: String,
    request: MigrationRequest,
    dest_bucket: String,
    progress: Option<ProgressCallback>,
    task_store: Arc<dyn TaskStore>,
    integrity_store: Arc<dyn IntegrityStore>,
) {
    if let Ok(Some(mut task)) = task_store.get(&task_id).await {
        task.status = TaskStatus::Running;
        task.started_at = Some(Utc::now());
        let _ = task_store.update(task).await;
    }

    let result = engine.run(&task_id, &request, &dest_bucket, progress).await;

    if let Ok(Some(mut task)) = task_store.get(&task_id).await {
        task.ended_at = Some(Utc::now());
        match result {
            Ok(report) => {
                task.counters.total_objects = report.total_objects;
                task.counters.total_bytes = report.total_bytes;
                task.counters.copied = report.copied;
                task.counters.copied_bytes = report.copied_bytes;
                task.counters.failed = report.failed;
                task.counters.verified = report.verified;
                task.errors = report.errors;
                if let Ok(summary) = integrity_store.summary(&task_id).await {
                    task.integrity_summary = summary;
                }
                if let Some(warning) = &report.verification_warning {
                    task.errors.push(warning.clone());
                }
                task.status = if report.was_cancelled {
                    TaskStatus::Cancelled
                } else if report.failed > 0 && report.copied == 0 && report.total_objects > 0 {
                    TaskStatus::Failed
                } else {
                    TaskStatus::Completed
                };
            }
            Err(e) => {
                error!(task_id, error = %e, "engine run failed");
                task.errors.push(e.to_string());
                task.status = TaskStatus::Failed;
            }
        }
        if let Err(e) = task_store.update(task).await {
            warn!(task_id, error = %e, "failed to persist final task state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::delta_planner::MigrationMode;
    use crate::integrity::InMemoryIntegrityStore;

    fn request() -> MigrationRequest {
        MigrationRequest {
            source_bucket: "src".to_string(),
            dest_bucket: None,
            source_prefix: String::new(),
            dest_prefix: String::new(),
            source_credentials: Credentials::ambient("us-east-1"),
            dest_credentials: None,
            dry_run: true,
            migration_mode: MigrationMode::FullRewrite,
            timeout: None,
        }
    }

    #[tokio::test]
    async fn submit_rejects_all_buckets_with_explicit_dest() {
        let orchestrator = Orchestrator::new(
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(InMemoryIntegrityStore::new()),
        );
        let mut bad = request();
        bad.source_bucket = String::new();
        bad.dest_bucket = Some("explicit".to_string());
        let result = orchestrator.submit(bad, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancel_on_unknown_task_returns_false() {
        let orchestrator = Orchestrator::new(
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(InMemoryIntegrityStore::new()),
        );
        let cancelled = orchestrator.cancel("does-not-exist").await.unwrap();
        assert!(!cancelled);
    }

    #[tokio::test]
    async fn task_store_round_trips_inserted_rows() {
        let store = InMemoryTaskStore::new();
        let task = Task::pending("t1".to_string(), request());
        store.insert(task.clone()).await.unwrap();
        let fetched = store.get("t1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "t1");
        assert_eq!(fetched.status, TaskStatus::Pending);
    }
}
