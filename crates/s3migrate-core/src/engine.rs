//! Execution Engine: the pipeline that turns a migration request
//! into a stream of per-object copies, the atomic counters those copies
//! update, cancellation plumbing, and the post-run verification pass.
//!
//! Single source of truth for "copied"/"failed"/"copied_bytes" (Open
//! Question a, resolved in SPEC_FULL.md/DESIGN.md): every worker updates
//! only the atomics on [`EngineCounters`]; there is no parallel
//! thread-local or channel-based accumulator to keep in sync.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex as SyncMutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::client_pool::ClientPool;
use crate::copy;
use crate::delta_planner::{self, MigrationMode};
use crate::error::{MigrateError, Result};
use crate::integrity::{self, IntegrityStore};
use crate::lister::{self, ListPages, ObjectRef, S3ListPages};
use crate::memory_manager::MemoryManager;
use crate::network_monitor::NetworkMonitor;
use crate::task::{CopyJob, CopyOutcome, MigrationRequest};
use crate::workload_tuner::{SizeHistogram, WorkloadTuner};

/// Provider-friendly hard ceiling on worker count, independent of
/// whatever the tuner/memory manager would otherwise allow.
pub const MAX_WORKERS_CEILING: usize = 100;

/// How often the result collector recomputes speed/ETA and invokes the
/// progress callback.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Default per-object retry budget for transient errors, separate
/// from the client pool's own transport-level retry-max-attempts.
const PER_OBJECT_RETRY_ATTEMPTS: u32 = 3;

/// Base delay before the first retry; doubled on each subsequent attempt
/// and scaled by the network monitor's quality bucket.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Shared, atomics-only progress state ("shared mutable progress
/// state"). The errors list is the one mutex-protected append-only
/// vector; everything else here is lock-free.
#[derive(Default)]
pub struct EngineCounters {
    pub total_objects: AtomicU64,
    pub total_bytes: AtomicU64,
    pub copied: AtomicU64,
    pub copied_bytes: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
    pub verified: AtomicU64,
    pub integrity_failed: AtomicU64,
    errors: SyncMutex<Vec<String>>,
}

impl EngineCounters {
    fn push_error(&self, message: impl Into<String>) {
        self.errors.lock().push(message.into());
    }

    pub fn snapshot_errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    pub fn progress(&self) -> f64 {
        let total = self.total_objects.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let copied = self.copied.load(Ordering::Relaxed);
        (100.0 * copied as f64 / total as f64).min(100.0)
    }
}

/// Point-in-time view of engine progress, handed to the caller-supplied
/// progress callback (never invoked from inside a worker holding a lock).
#[derive(Clone, Debug)]
pub struct ProgressSnapshot {
    pub total_objects: u64,
    pub total_bytes: u64,
    pub copied: u64,
    pub copied_bytes: u64,
    pub failed: u64,
    pub progress_percent: f64,
    pub speed_mb_s: f64,
    pub eta: Option<String>,
    pub errors: Vec<String>,
}

pub type ProgressCallback = Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;

/// Final report produced once the engine's pipeline completes (or is
/// cancelled).
#[derive(Clone, Debug)]
pub struct EngineReport {
    pub dry_run: bool,
    pub total_objects: u64,
    pub total_bytes: u64,
    pub copied: u64,
    pub copied_bytes: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub verified: u64,
    pub integrity_failed: u64,
    pub errors: Vec<String>,
    pub verification_warning: Option<String>,
    pub was_cancelled: bool,
}

/// The long-running pipeline that drives one migration end to end. Holds the client pools,
/// advisory components, and the cancellation flag; one instance drives
/// exactly one migration.
pub struct Engine {
    source_pool: Arc<ClientPool>,
    dest_pool: Arc<ClientPool>,
    has_separate_dest_credentials: bool,
    network: Arc<NetworkMonitor>,
    memory: Arc<MemoryManager>,
    integrity_store: Arc<dyn IntegrityStore>,
    stop: Arc<AtomicBool>,
    counters: Arc<EngineCounters>,
}

impl Engine {
    pub fn new(
        source_pool: Arc<ClientPool>,
        dest_pool: Arc<ClientPool>,
        has_separate_dest_credentials: bool,
        integrity_store: Arc<dyn IntegrityStore>,
    ) -> Self {
        Self {
            source_pool,
            dest_pool,
            has_separate_dest_credentials,
            network: Arc::new(NetworkMonitor::new()),
            memory: Arc::new(MemoryManager::new(1, MAX_WORKERS_CEILING)),
            integrity_store,
            stop: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(EngineCounters::default()),
        }
    }

    /// The cooperative cancellation handle: set by the orchestrator on a
    /// cancel request, observed by workers between jobs and on strategy
    /// entry.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn counters(&self) -> Arc<EngineCounters> {
        Arc::clone(&self.counters)
    }

    fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Run the full pipeline: list, plan, copy, verify. `dest_bucket` and
    /// `dest_prefix` are resolved by the caller (orchestrator) from the
    /// request so all-buckets fan-out can supply per-bucket values.
    pub async fn run(
        &self,
        task_id: &str,
        request: &MigrationRequest,
        dest_bucket: &str,
        progress: Option<ProgressCallback>,
    ) -> Result<EngineReport> {
        // Step 1: list source.
        let source_pages = S3ListPages::new(Arc::clone(&self.source_pool));
        let source_objects =
            lister::list_all(&source_pages, &request.source_bucket, &request.source_prefix).await?;

        let mut histogram = SizeHistogram::default();
        for obj in &source_objects {
            histogram.observe(obj.size);
        }
        let tuner = Arc::new(WorkloadTuner::new(&histogram));

        let total_bytes: u64 = source_objects.iter().map(|o| o.size).sum();
        self.counters
            .total_objects
            .store(source_objects.len() as u64, Ordering::Relaxed);
        self.counters.total_bytes.store(total_bytes, Ordering::Relaxed);

        // Step 2: dry run short-circuits before any mutation.
        if request.dry_run {
            let dest_listing = self.try_list_destination(dest_bucket, &request.dest_prefix).await;
            let planned = delta_planner::plan(
                request.migration_mode,
                &source_objects,
                &request.source_prefix,
                dest_listing.as_deref(),
                &request.dest_prefix,
            );
            return Ok(EngineReport {
                dry_run: true,
                total_objects: source_objects.len() as u64,
                total_bytes,
                copied: 0,
                copied_bytes: 0,
                failed: 0,
                cancelled: 0,
                verified: 0,
                integrity_failed: 0,
                errors: vec![format!(
                    "dry run: {} of {} objects would be copied",
                    planned.len(),
                    source_objects.len()
                )],
                verification_warning: None,
                was_cancelled: false,
            });
        }

        // Step 3: ensure destination bucket exists.
        self.ensure_destination_bucket(dest_bucket).await?;

        // Step 4: compute the job set.
        let dest_listing = if request.migration_mode == MigrationMode::Incremental {
            self.try_list_destination(dest_bucket, &request.dest_prefix).await
        } else {
            None
        };
        let to_copy = delta_planner::plan(
            request.migration_mode,
            &source_objects,
            &request.source_prefix,
            dest_listing.as_deref(),
            &request.dest_prefix,
        );

        let jobs: Vec<CopyJob> = to_copy
            .iter()
            .map(|obj| build_job(obj, &request.source_bucket, &request.source_prefix, dest_bucket, &request.dest_prefix))
            .collect();

        // Step 5: spawn N workers from a bounded queue.
        let worker_count = self.target_worker_count(&tuner, jobs.len());
        let (tx, rx): (Sender<CopyJob>, Receiver<CopyJob>) = bounded(worker_count.max(1) * 4);

        let mut workers = JoinSet::new();
        for _ in 0..worker_count.max(1) {
            workers.spawn(self.clone_for_worker(task_id.to_string(), rx.clone(), Arc::clone(&tuner)));
        }

        let collector = self.spawn_progress_collector(progress.clone(), Arc::clone(&self.counters));

        let producer_stop = Arc::clone(&self.stop);
        for job in jobs {
            if producer_stop.load(Ordering::Relaxed) {
                break;
            }
            if tx.send(job).await.is_err() {
                break;
            }
        }
        drop(tx);

        while workers.join_next().await.is_some() {}
        collector.abort();

        let was_cancelled = self.is_cancelled();

        // Step 8: post-run verification pass.
        let verification_warning = self
            .verify(dest_bucket, &request.dest_prefix, &source_objects)
            .await;

        Ok(self.finalize_report(was_cancelled, verification_warning))
    }

    fn finalize_report(
        &self,
        was_cancelled: bool,
        verification_warning: Option<String>,
    ) -> EngineReport {
        EngineReport {
            dry_run: false,
            total_objects: self.counters.total_objects.load(Ordering::Relaxed),
            total_bytes: self.counters.total_bytes.load(Ordering::Relaxed),
            copied: self.counters.copied.load(Ordering::Relaxed),
            copied_bytes: self.counters.copied_bytes.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
            verified: self.counters.verified.load(Ordering::Relaxed),
            integrity_failed: self.counters.integrity_failed.load(Ordering::Relaxed),
            errors: self.counters.snapshot_errors(),
            verification_warning,
            was_cancelled,
        }
    }

    fn target_worker_count(&self, tuner: &WorkloadTuner, job_count: usize) -> usize {
        let pattern_default = tuner.pattern().worker_config().default;
        let memory_bound = self.memory.optimal_workers(MAX_WORKERS_CEILING, pattern_default);
        pattern_default
            .min(memory_bound)
            .min(MAX_WORKERS_CEILING)
            .min(job_count.max(1))
            .max(1)
    }

    async fn try_list_destination(&self, bucket: &str, prefix: &str) -> Option<Vec<ObjectRef>> {
        let pages = S3ListPages::new(Arc::clone(&self.dest_pool));
        match lister::list_all(&pages, bucket, prefix).await {
            Ok(objects) => Some(objects),
            Err(e) => {
                warn!(bucket, prefix, error = %e, "destination listing failed; falling back to full rewrite");
                self.counters
                    .push_error(format!("destination listing failed: {e}"));
                None
            }
        }
    }

    /// Enumerate every bucket visible to the source credentials, used to
    /// drive an all-buckets migration (an empty `source_bucket` in the
    /// request fans out over every bucket the source account owns).
    pub async fn list_source_buckets(&self) -> Result<Vec<String>> {
        let client = self.source_pool.client(crate::client_pool::Selection::RoundRobin);
        let response = client
            .list_buckets()
            .send()
            .await
            .map_err(|e| crate::client_pool::provider_error(&self.source_pool, "list_buckets", e))?;

        Ok(response
            .buckets()
            .iter()
            .filter_map(|b| b.name())
            .map(str::to_string)
            .collect())
    }

    async fn ensure_destination_bucket(&self, bucket: &str) -> Result<()> {
        let client = self.dest_pool.client(crate::client_pool::Selection::RoundRobin);
        match client.create_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let service_err = e.to_string();
                if service_err.contains("BucketAlreadyOwnedByYou")
                    || service_err.contains("BucketAlreadyExists")
                {
                    debug!(bucket, "destination bucket already exists, treating as success");
                    Ok(())
                } else {
                    Err(crate::client_pool::provider_error(&self.dest_pool, "create_bucket", e))
                }
            }
        }
    }

    /// Re-list the destination and compare against the source totals
    /// Destination larger is a warning ("pre-existing
    /// data"); destination smaller is a verification error.
    async fn verify(
        &self,
        dest_bucket: &str,
        dest_prefix: &str,
        source_objects: &[ObjectRef],
    ) -> Option<String> {
        let dest_objects = match self.try_list_destination(dest_bucket, dest_prefix).await {
            Some(objects) => objects,
            None => return Some("verification skipped: destination listing failed".to_string()),
        };

        let source_bytes: u64 = source_objects.iter().map(|o| o.size).sum();
        let dest_bytes: u64 = dest_objects.iter().map(|o| o.size).sum();

        if dest_objects.len() > source_objects.len() || dest_bytes > source_bytes {
            Some("pre-existing data: destination contains more objects/bytes than source".to_string())
        } else if dest_objects.len() < source_objects.len() || dest_bytes < source_bytes {
            let message = format!(
                "missing data: destination has {} objects/{} bytes, source has {} objects/{} bytes",
                dest_objects.len(),
                dest_bytes,
                source_objects.len(),
                source_bytes
            );
            self.counters.push_error(message.clone());
            Some(message)
        } else {
            None
        }
    }

    fn spawn_progress_collector(
        &self,
        progress: Option<ProgressCallback>,
        counters: Arc<EngineCounters>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let Some(callback) = progress else { return };
            let mut last_bytes = 0u64;
            let mut last_tick = Instant::now();
            loop {
                tokio::time::sleep(PROGRESS_INTERVAL).await;
                let copied_bytes = counters.copied_bytes.load(Ordering::Relaxed);
                let elapsed = last_tick.elapsed().as_secs_f64().max(0.001);
                let delta_bytes = copied_bytes.saturating_sub(last_bytes);
                let speed_mb_s = (delta_bytes as f64 / (1024.0 * 1024.0)) / elapsed;
                last_bytes = copied_bytes;
                last_tick = Instant::now();

                let total_bytes = counters.total_bytes.load(Ordering::Relaxed);
                let eta = if speed_mb_s > 0.0 && total_bytes > copied_bytes {
                    let remaining_mb = (total_bytes - copied_bytes) as f64 / (1024.0 * 1024.0);
                    Some(format!("{:.0}s", remaining_mb / speed_mb_s))
                } else if total_bytes <= copied_bytes {
                    Some("0s".to_string())
                } else {
                    None
                };

                let snapshot = ProgressSnapshot {
                    total_objects: counters.total_objects.load(Ordering::Relaxed),
                    total_bytes,
                    copied: counters.copied.load(Ordering::Relaxed),
                    copied_bytes,
                    failed: counters.failed.load(Ordering::Relaxed),
                    progress_percent: counters.progress(),
                    speed_mb_s,
                    eta,
                    errors: counters.snapshot_errors(),
                };
                callback(snapshot);
            }
        })
    }

    fn clone_for_worker(
        &self,
        task_id: String,
        rx: Receiver<CopyJob>,
        tuner: Arc<WorkloadTuner>,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        let source_pool = Arc::clone(&self.source_pool);
        let dest_pool = Arc::clone(&self.dest_pool);
        let has_separate_dest_credentials = self.has_separate_dest_credentials;
        let integrity_store = Arc::clone(&self.integrity_store);
        let stop = Arc::clone(&self.stop);
        let counters = Arc::clone(&self.counters);
        let network = Arc::clone(&self.network);

        async move {
            while let Ok(job) = rx.recv().await {
                if stop.load(Ordering::Relaxed) {
                    counters.cancelled.fetch_add(1, Ordering::Relaxed);
                    continue;
                }

                let started = Instant::now();
                let outcome = run_one_job_with_retry(
                    &task_id,
                    &job,
                    &source_pool,
                    &dest_pool,
                    has_separate_dest_credentials,
                    &integrity_store,
                    &network,
                    &stop,
                )
                .await;

                let elapsed = started.elapsed();
                let speed_mb_s = (job.size as f64 / (1024.0 * 1024.0)) / elapsed.as_secs_f64().max(0.001);
                tuner.record_performance(speed_mb_s, 1, job.size);
                network.record_sample(elapsed, speed_mb_s, 0.0);

                match outcome {
                    CopyOutcome::Succeeded { bytes, integrity_valid } => {
                        counters.copied.fetch_add(1, Ordering::Relaxed);
                        counters.copied_bytes.fetch_add(bytes, Ordering::Relaxed);
                        match integrity_valid {
                            Some(true) => {
                                counters.verified.fetch_add(1, Ordering::Relaxed);
                            }
                            Some(false) => {
                                counters.integrity_failed.fetch_add(1, Ordering::Relaxed);
                            }
                            None => {}
                        }
                    }
                    CopyOutcome::Failed { error } => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        counters.push_error(format!("{}: {}", job.source_key, error));
                    }
                    CopyOutcome::Cancelled => {
                        counters.cancelled.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }
}

fn build_job(
    source: &ObjectRef,
    source_bucket: &str,
    source_prefix: &str,
    dest_bucket: &str,
    dest_prefix: &str,
) -> CopyJob {
    let stripped = source.key.strip_prefix(source_prefix).unwrap_or(&source.key);
    CopyJob {
        source_bucket: source_bucket.to_string(),
        source_key: source.key.clone(),
        dest_bucket: dest_bucket.to_string(),
        dest_key: format!("{dest_prefix}{stripped}"),
        size: source.size,
    }
}

/// Runs one job to completion, retrying transient provider/IO errors up
/// to [`PER_OBJECT_RETRY_ATTEMPTS`] times with exponential backoff.
/// This is a layer above the client pool's own transport-level retries:
/// it re-drives the whole copy (a fresh GET/PUT or CopyObject call), not
/// a single HTTP request. Input/access/verification errors never retry.
#[allow(clippy::too_many_arguments)]
async fn run_one_job_with_retry(
    task_id: &str,
    job: &CopyJob,
    source_pool: &Arc<ClientPool>,
    dest_pool: &Arc<ClientPool>,
    has_separate_dest_credentials: bool,
    integrity_store: &Arc<dyn IntegrityStore>,
    network: &Arc<NetworkMonitor>,
    stop: &Arc<AtomicBool>,
) -> CopyOutcome {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        if stop.load(Ordering::Relaxed) {
            return CopyOutcome::Cancelled;
        }

        match run_one_job(task_id, job, source_pool, dest_pool, has_separate_dest_credentials, integrity_store).await {
            Ok(outcome) => return outcome,
            Err(MigrateError::Cancelled) => return CopyOutcome::Cancelled,
            Err(e) if e.is_retryable() && attempt < PER_OBJECT_RETRY_ATTEMPTS => {
                let delay = network.optimal_retry_delay(RETRY_BASE_DELAY * attempt);
                warn!(
                    key = %job.source_key,
                    attempt,
                    max_attempts = PER_OBJECT_RETRY_ATTEMPTS,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient copy error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                let final_error = if e.is_retryable() {
                    e.into_transient(attempt)
                } else {
                    e
                };
                info!(key = %job.source_key, error = %final_error, "copy job failed");
                return CopyOutcome::Failed { error: final_error.to_string() };
            }
        }
    }
}

async fn run_one_job(
    task_id: &str,
    job: &CopyJob,
    source_pool: &Arc<ClientPool>,
    dest_pool: &Arc<ClientPool>,
    has_separate_dest_credentials: bool,
    integrity_store: &Arc<dyn IntegrityStore>,
) -> Result<CopyOutcome> {
    let result = copy::execute(job, source_pool, dest_pool, has_separate_dest_credentials, true).await?;
    let integrity_result = integrity::evaluate(
        task_id,
        &job.dest_key,
        result.source_etag.as_deref(),
        result.dest_etag.as_deref(),
        job.size,
        result.bytes,
        result.hashes.as_ref(),
    );
    let integrity_valid = Some(integrity_result.is_valid);
    integrity::persist_best_effort(integrity_store, integrity_result).await;
    Ok(CopyOutcome::Succeeded { bytes: result.bytes, integrity_valid })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_bounded_by_one_hundred() {
        let counters = EngineCounters::default();
        counters.total_objects.store(4, Ordering::Relaxed);
        counters.copied.store(10, Ordering::Relaxed); // shouldn't happen, but must not break the bound
        assert_eq!(counters.progress(), 100.0);
    }

    #[test]
    fn build_job_strips_source_prefix_and_applies_dest_prefix() {
        let source = ObjectRef {
            key: "incoming/photos/a.jpg".to_string(),
            size: 10,
            last_modified: None,
        };
        let job = build_job(&source, "src-bucket", "incoming/", "dst-bucket", "archive/");
        assert_eq!(job.dest_key, "archive/photos/a.jpg");
        assert_eq!(job.source_key, "incoming/photos/a.jpg");
    }
}
