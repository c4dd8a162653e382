//! Error taxonomy for the migration engine.
//!
//! One variant per failure kind: input, auth/access, transient,
//! pagination anomaly, integrity, verification. Transient and per-object
//! errors are recoverable (the caller keeps going); engine-level errors
//! abort the task.

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, MigrateError>;

/// Errors surfaced by the migration engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MigrateError {
    /// Missing required field or conflicting request options.
    #[error("invalid migration request: {0}")]
    InvalidRequest(String),

    /// Credential retrieval or permission failure.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Exhausted retries on a transient network/provider error.
    #[error("transient error after {attempts} attempts: {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: Box<MigrateError>,
    },

    /// Underlying S3-compatible provider call failed.
    #[error("provider error during {operation}: {message}")]
    Provider { operation: String, message: String },

    /// Listing could not make progress: loop detected, page cap hit,
    /// or a non-reference provider omitted both continuation-token and key.
    #[error("pagination error: {0}")]
    Pagination(String),

    /// Integrity comparison failed to even attempt (not a mismatch — a
    /// mismatch is a non-valid `IntegrityResult`, not an error).
    #[error("integrity check error: {0}")]
    Integrity(String),

    /// Post-copy verification pass found the destination smaller than the
    /// source; "pre-existing data" (destination larger) is a warning,
    /// not an error, and does not construct this variant.
    #[error("verification failed: {0}")]
    Verification(String),

    /// The task could not be created, found, or transitioned.
    #[error("task error: {0}")]
    Task(String),

    /// Wraps an I/O failure (buffer pool allocation, local scratch files).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wraps a (de)serialization failure of a request/response body.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The operation was cancelled cooperatively.
    #[error("cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Wrap `self` as the source of a [`MigrateError::Transient`] after
    /// `attempts` retries were exhausted.
    pub fn into_transient(self, attempts: u32) -> Self {
        MigrateError::Transient {
            attempts,
            source: Box::new(self),
        }
    }

    /// Whether this error class is worth retrying (timeouts, resets, 5xx).
    /// Only provider/transport failures are retried; input, access, and
    /// verification errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MigrateError::Provider { .. } | MigrateError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_wraps_source_message() {
        let inner = MigrateError::Provider {
            operation: "get_object".to_string(),
            message: "timeout".to_string(),
        };
        let wrapped = inner.into_transient(3);
        assert_eq!(
            wrapped.to_string(),
            "transient error after 3 attempts: provider error during get_object: timeout"
        );
    }

    #[test]
    fn retryable_classification() {
        assert!(MigrateError::Provider {
            operation: "put_object".into(),
            message: "503".into()
        }
        .is_retryable());
        assert!(!MigrateError::InvalidRequest("missing bucket".into()).is_retryable());
        assert!(!MigrateError::Verification("undercopy".into()).is_retryable());
    }
}
