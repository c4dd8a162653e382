//! Execution engine for large-scale S3-compatible object migrations.
//!
//! This crate moves objects between S3-compatible buckets — same
//! account, cross-account, or across providers (AWS, Cloudflare R2,
//! MinIO, Backblaze B2) — with content-addressed integrity checking,
//! adaptive worker scaling, and resumable incremental runs. It is the
//! engine underneath a thin HTTP surface (`s3migrate-server`); nothing
//! here depends on an HTTP framework, a database driver, or a process
//! supervisor. Persistence for tasks and integrity rows is expressed as
//! two small ports (`orchestrator::TaskStore`, `integrity::IntegrityStore`)
//! so a caller can back them with Postgres, SQLite, or nothing at all.
//!
//! # Module map
//!
//! - [`config`] — credentials, endpoint profiles, client pool configuration
//! - [`client_pool`] — pooled S3 clients with round-robin/key-hash selection
//! - [`buffer_pool`] — reusable byte buffers for streaming copy paths
//! - [`hasher`] — streaming MD5/SHA-1/SHA-256/CRC32 + tee reader
//! - [`integrity`] — integrity evaluation and its persistence port
//! - [`network_monitor`] — latency-bucket classification and scale factors
//! - [`memory_manager`] — adaptive per-worker memory estimation
//! - [`workload_tuner`] — workload-pattern classification and worker bounds
//! - [`lister`] — paginated object listing with loop detection
//! - [`delta_planner`] — full-rewrite and incremental copy planning
//! - [`task`] — migration request/task data model
//! - [`copy`] — copy strategy dispatch (simple, multipart, streaming)
//! - [`engine`] — the worker pool that drives one migration to completion
//! - [`orchestrator`] — accepts requests, launches engines, tracks tasks
//! - [`metrics`] — optional Prometheus metrics (`metrics` feature)

pub mod buffer_pool;
pub mod client_pool;
pub mod config;
pub mod copy;
pub mod delta_planner;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod integrity;
pub mod lister;
pub mod memory_manager;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod network_monitor;
pub mod orchestrator;
pub mod task;
pub mod workload_tuner;

pub use client_pool::{ClientPool, Selection};
pub use config::{ClientPoolConfig, Credentials, EndpointProfile};
pub use engine::{Engine, EngineReport, ProgressCallback, ProgressSnapshot};
pub use error::{MigrateError, Result};
pub use orchestrator::{InMemoryTaskStore, Orchestrator, TaskStore};
pub use task::{MigrationRequest, Task, TaskStatus};
