//! API Server
//!
//! Wires routes, middleware, and state into a runnable `axum::Router`.

use std::net::SocketAddr;

use axum::{middleware, Router};
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;

use crate::middleware as mw;
use crate::routes;
use crate::state::{AppState, ServerConfig};

/// Server bind configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub server: ServerConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            server: ServerConfig::default(),
        }
    }
}

impl ApiConfig {
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }
}

/// Runnable API server instance.
pub struct ApiServer {
    config: ApiConfig,
    state: AppState,
    router: Router,
}

impl ApiServer {
    pub fn new(config: ApiConfig) -> Self {
        let state = AppState::new(config.server.clone());
        let router = Self::build_router(&state);
        Self {
            config,
            state,
            router,
        }
    }

    pub fn with_state(state: AppState, config: ApiConfig) -> Self {
        let router = Self::build_router(&state);
        Self {
            config,
            state,
            router,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ApiConfig::default())
    }

    fn build_router(state: &AppState) -> Router {
        let api = routes::api_router(state.clone());

        api.layer(middleware::from_fn(mw::error_handler_middleware))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                mw::cors_middleware,
            ))
            .layer(middleware::from_fn(mw::request_id_middleware))
            .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
    }

    pub fn addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn run(self) -> s3migrate_core::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(s3migrate_core::error::MigrateError::Io)?;

        tracing::info!(addr = %self.config.bind_addr, "s3migrate-server starting");
        tracing::info!("  Health:      http://{}/health", self.config.bind_addr);
        tracing::info!(
            "  Migrations:  http://{}/api/v1/migrations",
            self.config.bind_addr
        );
        #[cfg(feature = "metrics")]
        tracing::info!("  Metrics:     http://{}/metrics", self.config.bind_addr);

        axum::serve(listener, self.router)
            .await
            .map_err(s3migrate_core::error::MigrateError::Io)?;

        Ok(())
    }

    pub async fn run_until<F>(self, shutdown_signal: F) -> s3migrate_core::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(s3migrate_core::error::MigrateError::Io)?;

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(s3migrate_core::error::MigrateError::Io)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = ApiServer::new(ApiConfig::default());
        let router = server.router();

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn body_size_limit_is_enforced() {
        let mut server_config = ServerConfig::default();
        server_config.max_body_size = 1024;
        let config = ApiConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            server: server_config,
        };
        let server = ApiServer::new(config);
        let router = server.router();

        let oversized_body = vec![b'x'; 2048];
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/migrations")
            .header("content-type", "application/json")
            .body(Body::from(oversized_body))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
