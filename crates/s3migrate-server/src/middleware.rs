//! HTTP Middleware
//!
//! Request ID propagation, CORS headers, and (when the `metrics` feature
//! is enabled) per-request HTTP metrics. Outermost layers run first on
//! the way in and last on the way out.

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::state::AppState;

/// Extract or generate a request id for tracing.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", header_value);
    }
    response
}

#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Outermost layer; a production deployment hangs structured error
/// logging/enrichment off this point.
pub async fn error_handler_middleware(request: Request, next: Next) -> Response {
    next.run(request).await
}

/// Add CORS headers only when origins are explicitly configured — no
/// wildcard fallback.
pub async fn cors_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;

    if state.config.cors_enabled && !state.config.cors_origins.is_empty() {
        if let Some(origin) = state.config.cors_origins.first() {
            if let Ok(header_value) = HeaderValue::from_str(origin) {
                response
                    .headers_mut()
                    .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, header_value);
            }
        }
        response.headers_mut().insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        );
    }

    response
}
