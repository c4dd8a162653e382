//! Thin HTTP surface over the S3 migration execution engine.
//!
//! This crate is intentionally small: it accepts a migration request,
//! hands it to `s3migrate_core::Orchestrator`, and exposes status/cancel
//! endpoints. It owns no migration logic of its own and depends on
//! `s3migrate-core` only through its public `TaskStore`/`IntegrityStore`
//! trait surface, so a production deployment can swap the in-memory
//! stores built by [`state::AppState::new`] for Postgres-backed ones
//! without touching this crate.

pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;
pub mod types;

pub use server::{ApiConfig, ApiServer};
pub use state::AppState;
