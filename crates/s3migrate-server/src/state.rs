//! Application State
//!
//! Shared state for all HTTP handlers: the orchestrator, its task/
//! integrity stores, and server-level configuration. A handful of
//! `Arc<dyn Trait>` service handles plus a config struct, narrowed to
//! what this surface actually touches — the orchestrator is the only
//! collaborator.

use std::sync::Arc;

use s3migrate_core::integrity::{InMemoryIntegrityStore, IntegrityStore};
use s3migrate_core::orchestrator::{InMemoryTaskStore, Orchestrator, TaskStore};

#[cfg(feature = "metrics")]
use s3migrate_core::metrics::EngineMetrics;

/// Shared application state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub config: Arc<ServerConfig>,
    #[cfg(feature = "metrics")]
    pub metrics: Option<Arc<EngineMetrics>>,
}

/// Server-level configuration, independent of any one migration request.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_body_size: usize,
    pub cors_enabled: bool,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024, // 10MB: migration requests are small JSON bodies
            cors_enabled: true,
            // No wildcard origin by default; deployments configure this explicitly.
            cors_origins: Vec::new(),
        }
    }
}

impl AppState {
    /// Build state with in-memory task/integrity stores — suitable for a
    /// single-process deployment or local testing. A production
    /// deployment swaps `task_store`/`integrity_store` for
    /// Postgres-backed implementations of the same traits and calls
    /// [`AppState::with_stores`] instead.
    pub fn new(config: ServerConfig) -> Self {
        let task_store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let integrity_store: Arc<dyn IntegrityStore> = Arc::new(InMemoryIntegrityStore::new());
        Self::with_stores(config, task_store, integrity_store)
    }

    pub fn with_stores(
        config: ServerConfig,
        task_store: Arc<dyn TaskStore>,
        integrity_store: Arc<dyn IntegrityStore>,
    ) -> Self {
        Self {
            orchestrator: Arc::new(Orchestrator::new(task_store, integrity_store)),
            config: Arc::new(config),
            #[cfg(feature = "metrics")]
            metrics: EngineMetrics::new().map(Arc::new).ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_wildcard_cors_origin() {
        let config = ServerConfig::default();
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn state_builds_with_in_memory_stores() {
        let state = AppState::new(ServerConfig::default());
        assert!(Arc::strong_count(&state.orchestrator) >= 1);
    }
}
