//! Client Pool: a fixed-size vector of pre-built object-store
//! clients for one endpoint, selected round-robin or by stable hash.
//!
//! Each client is built from an `aws-config` loader seeded with
//! region/credentials/endpoint, then an `aws-sdk-s3::Client` constructed
//! from it with `force_path_style` applied from the endpoint profile.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials as AwsCredentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::Client;

use crate::config::ClientPoolConfig;
use crate::error::{MigrateError, Result};

/// How a caller wants a client selected from the pool.
#[derive(Clone, Copy, Debug)]
pub enum Selection<'a> {
    /// Round-robin; good for bulk, order-insensitive work.
    RoundRobin,
    /// Hash of a stable key; good for locality (same key always hits the
    /// same client, useful when a provider rate-limits per-connection).
    KeyHash(&'a str),
}

/// A fixed-size, resizable pool of pre-built clients for one endpoint.
pub struct ClientPool {
    config: ClientPoolConfig,
    clients: parking_lot::RwLock<Vec<Arc<Client>>>,
    next: AtomicUsize,
    requests: AtomicU64,
    errors: AtomicU64,
}

impl ClientPool {
    /// Build a pool of `config.pool_size` clients against one endpoint.
    pub async fn new(config: ClientPoolConfig) -> Result<Self> {
        let clients = Self::build_clients(&config, config.pool_size).await?;
        Ok(Self {
            config,
            clients: parking_lot::RwLock::new(clients),
            next: AtomicUsize::new(0),
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        })
    }

    async fn build_clients(config: &ClientPoolConfig, n: usize) -> Result<Vec<Arc<Client>>> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(Arc::new(Self::build_one(config).await?));
        }
        Ok(out)
    }

    async fn build_one(config: &ClientPoolConfig) -> Result<Client> {
        let region = Region::new(config.credentials.region.clone());
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region.clone());

        if let Some(endpoint) = &config.credentials.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        if config.credentials.is_explicit() {
            let creds = AwsCredentials::new(
                config.credentials.access_key.clone().unwrap_or_default(),
                config.credentials.secret_key.clone().unwrap_or_default(),
                config.credentials.session_token.clone(),
                None,
                "s3migrate-static",
            );
            loader = loader.credentials_provider(creds);
        }

        let aws_config = loader.load().await;

        // `disable_redirects` is consulted by callers (lister, copy
        // strategies) rather than baked into the transport here: a 301
        // PermanentRedirect from a non-reference provider should surface as
        // a provider error instead of being followed transparently, since
        // following it would silently move the migration to a different
        // endpoint mid-flight. The SDK's default connector does not follow
        // redirects for S3 operations, so no override is required; the flag
        // exists so higher layers can decide whether a 3xx response is
        // retryable or fatal.
        let timeout_config = aws_sdk_s3::config::timeout::TimeoutConfig::builder()
            .operation_timeout(config.request_timeout)
            .operation_attempt_timeout(config.request_timeout)
            .build();

        let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
            .force_path_style(config.profile.force_path_style)
            .retry_config(
                aws_sdk_s3::config::retry::RetryConfig::standard()
                    .with_max_attempts(config.retry_max_attempts),
            )
            .timeout_config(timeout_config)
            .region(region);

        Ok(Client::from_conf(s3_config.build()))
    }

    /// Pick a client per `selection`.
    pub fn client(&self, selection: Selection<'_>) -> Arc<Client> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let clients = self.clients.read();
        let idx = match selection {
            Selection::RoundRobin => self.next.fetch_add(1, Ordering::Relaxed) % clients.len(),
            Selection::KeyHash(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() as usize) % clients.len()
            }
        };
        Arc::clone(&clients[idx])
    }

    /// Record that a call made with a pool-issued client failed.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn total_errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// `errors / requests`, `0.0` when no requests have been made yet.
    pub fn error_rate(&self) -> f64 {
        let requests = self.total_requests();
        if requests == 0 {
            0.0
        } else {
            self.total_errors() as f64 / requests as f64
        }
    }

    /// Resize the pool. Downsizing truncates; upsizing constructs new
    /// clients to fill the difference.
    pub async fn resize(&self, new_size: usize) -> Result<()> {
        let new_size = new_size.max(1);
        let current_len = self.clients.read().len();
        if new_size < current_len {
            self.clients.write().truncate(new_size);
        } else if new_size > current_len {
            let extra = Self::build_clients(&self.config, new_size - current_len).await?;
            self.clients.write().extend(extra);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn profile(&self) -> &crate::config::EndpointProfile {
        &self.config.profile
    }

    /// Presigned GET URL, for resumable downloads or out-of-band
    /// verification tooling sitting outside the migration engine itself.
    pub async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: std::time::Duration,
    ) -> Result<String> {
        let client = self.client(Selection::KeyHash(key));
        let presigning_config = aws_sdk_s3::presigning::PresigningConfig::expires_in(expires_in)
            .map_err(|e| provider_error(self, "presigning_config", e))?;
        let presigned = client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|e| provider_error(self, "get_object_presigned", e))?;
        Ok(presigned.uri().to_string())
    }
}

/// Maps a provider error into the pool's error accounting and a
/// [`MigrateError::Provider`].
pub fn provider_error(pool: &ClientPool, operation: &str, err: impl std::fmt::Display) -> MigrateError {
    pool.record_error();
    MigrateError::Provider {
        operation: operation.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Credentials, EndpointProfile};

    #[tokio::test]
    async fn pool_resizes_up_and_down() {
        let config = ClientPoolConfig::new(Credentials::ambient("us-east-1"))
            .profile(EndpointProfile::minio("http://localhost:9000"))
            .pool_size(2);
        let pool = ClientPool::new(config).await.expect("pool builds");
        assert_eq!(pool.len(), 2);

        pool.resize(5).await.unwrap();
        assert_eq!(pool.len(), 5);

        pool.resize(1).await.unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn error_rate_tracks_requests_and_errors() {
        let config = ClientPoolConfig::new(Credentials::ambient("us-east-1")).pool_size(1);
        let pool = ClientPool::new(config).await.unwrap();
        assert_eq!(pool.error_rate(), 0.0);

        let _ = pool.client(Selection::RoundRobin);
        pool.record_error();
        assert!((pool.error_rate() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn key_hash_selection_is_stable() {
        let config = ClientPoolConfig::new(Credentials::ambient("us-east-1")).pool_size(4);
        let pool = ClientPool::new(config).await.unwrap();
        let first = Arc::as_ptr(&pool.client(Selection::KeyHash("object/key/one")));
        let second = Arc::as_ptr(&pool.client(Selection::KeyHash("object/key/one")));
        assert_eq!(first, second);
    }
}
