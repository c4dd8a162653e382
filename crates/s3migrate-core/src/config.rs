//! Credentials and endpoint profiles.
//!
//! `EndpointProfile` captures the non-reference-provider quirks a copy
//! strategy or lister needs to know about: path-style addressing, redirect
//! suppression, and whether the provider's ETag semantics match the
//! reference protocol. Presets cover the providers most migrations
//! target: AWS itself, R2, MinIO, and B2.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Static or ambient credentials for one endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub session_token: Option<String>,
    pub region: String,
    pub endpoint_url: Option<String>,
}

impl Credentials {
    /// Use the ambient credential chain (environment, instance profile,
    /// web identity, etc.) against the reference AWS endpoint.
    pub fn ambient(region: impl Into<String>) -> Self {
        Self {
            access_key: None,
            secret_key: None,
            session_token: None,
            region: region.into(),
            endpoint_url: None,
        }
    }

    /// Static access/secret key pair.
    pub fn static_keys(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key: Some(access_key.into()),
            secret_key: Some(secret_key.into()),
            session_token: None,
            region: region.into(),
            endpoint_url: None,
        }
    }

    pub fn session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    pub fn is_explicit(&self) -> bool {
        self.access_key.is_some() && self.secret_key.is_some()
    }
}

/// Quirks of a specific S3-compatible endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointProfile {
    /// Force `{endpoint}/{bucket}/{key}` addressing instead of virtual-hosted.
    pub force_path_style: bool,
    /// Disable HTTP redirect following (defeats 301 PermanentRedirect loops
    /// some non-reference providers emit for bucket/region mismatches).
    pub disable_redirects: bool,
    /// Whether this provider's ETag follows reference semantics (MD5 for
    /// single-part, composite for multipart). When false, the Integrity
    /// Manager treats ETag equality as advisory only.
    pub reference_etag_semantics: bool,
    /// Whether cross-account / cross-endpoint server-side copy is supported.
    /// Reference AWS supports same-account server-side copy only when both
    /// buckets share a client; non-reference providers frequently don't
    /// support server-side copy across endpoints at all.
    pub supports_cross_account_copy: bool,
    /// Endpoint URL this preset implies, applied to a `Credentials` value
    /// that doesn't already carry an explicit one. `None` for the
    /// reference AWS profile, which resolves its endpoint from the region
    /// the usual `aws-config` way.
    pub default_endpoint_url: Option<String>,
}

impl Default for EndpointProfile {
    fn default() -> Self {
        Self::aws()
    }
}

impl EndpointProfile {
    /// Reference AWS S3 profile.
    pub fn aws() -> Self {
        Self {
            force_path_style: false,
            disable_redirects: false,
            reference_etag_semantics: true,
            supports_cross_account_copy: false,
            default_endpoint_url: None,
        }
    }

    /// Cloudflare R2. `account_id` is the Cloudflare account hosting the
    /// bucket; R2's S3-compatible endpoint is always
    /// `https://{account_id}.r2.cloudflarestorage.com`.
    pub fn r2(account_id: impl Into<String>) -> Self {
        let account_id = account_id.into();
        Self {
            force_path_style: false,
            disable_redirects: true,
            reference_etag_semantics: false,
            supports_cross_account_copy: false,
            default_endpoint_url: Some(format!(
                "https://{account_id}.r2.cloudflarestorage.com"
            )),
        }
    }

    /// MinIO (or any self-hosted path-style deployment) at `endpoint`
    /// (e.g. `"http://localhost:9000"`).
    pub fn minio(endpoint: impl Into<String>) -> Self {
        Self {
            force_path_style: true,
            disable_redirects: true,
            reference_etag_semantics: true,
            supports_cross_account_copy: false,
            default_endpoint_url: Some(endpoint.into()),
        }
    }

    /// Backblaze B2 S3-compatible API in `region` (e.g. `"us-west-002"`).
    pub fn b2(region: impl Into<String>) -> Self {
        let region = region.into();
        Self {
            force_path_style: true,
            disable_redirects: true,
            reference_etag_semantics: false,
            supports_cross_account_copy: false,
            default_endpoint_url: Some(format!("https://s3.{region}.backblazeb2.com")),
        }
    }
}

/// Client pool construction options.
#[derive(Clone)]
pub struct ClientPoolConfig {
    pub credentials: Credentials,
    pub profile: EndpointProfile,
    pub pool_size: usize,
    pub retry_max_attempts: u32,
    pub request_timeout: Duration,
}

impl ClientPoolConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            profile: EndpointProfile::aws(),
            pool_size: 8,
            retry_max_attempts: 3,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Apply an endpoint preset. If the credentials don't already carry an
    /// explicit `endpoint_url`, the preset's `default_endpoint_url` (when
    /// any) fills it in.
    pub fn profile(mut self, profile: EndpointProfile) -> Self {
        if self.credentials.endpoint_url.is_none() {
            if let Some(url) = &profile.default_endpoint_url {
                self.credentials.endpoint_url = Some(url.clone());
            }
        }
        self.profile = profile;
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    pub fn retry_max_attempts(mut self, attempts: u32) -> Self {
        self.retry_max_attempts = attempts.max(1);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minio_forces_path_style() {
        let profile = EndpointProfile::minio("http://localhost:9000");
        assert!(profile.force_path_style);
        assert!(profile.disable_redirects);
        assert_eq!(profile.default_endpoint_url.as_deref(), Some("http://localhost:9000"));
    }

    #[test]
    fn explicit_credentials_detected() {
        let creds = Credentials::static_keys("ak", "sk", "us-east-1");
        assert!(creds.is_explicit());
        let ambient = Credentials::ambient("us-east-1");
        assert!(!ambient.is_explicit());
    }

    #[test]
    fn profile_prefills_endpoint_url_when_credentials_have_none() {
        let config = ClientPoolConfig::new(Credentials::ambient("auto"))
            .profile(EndpointProfile::r2("abc123"));
        assert_eq!(
            config.credentials.endpoint_url.as_deref(),
            Some("https://abc123.r2.cloudflarestorage.com")
        );
    }

    #[test]
    fn explicit_endpoint_url_is_not_overridden_by_profile() {
        let config = ClientPoolConfig::new(
            Credentials::ambient("auto").endpoint_url("https://custom.example.com"),
        )
        .profile(EndpointProfile::r2("abc123"));
        assert_eq!(
            config.credentials.endpoint_url.as_deref(),
            Some("https://custom.example.com")
        );
    }
}
