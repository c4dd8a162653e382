//! Cross-account streaming copy: GET from the source endpoint,
//! tee through a Streaming Hasher, PUT into the destination endpoint.
//! Used whenever separate destination credentials are configured, since
//! no S3-compatible provider performs a true server-side copy across
//! distinct credential sets.

use std::sync::Arc;

use aws_smithy_types::byte_stream::ByteStream;
use tokio::io::AsyncReadExt;

use crate::client_pool::{provider_error, ClientPool, Selection};
use crate::copy::CopyResult;
use crate::error::Result;
use crate::hasher::TeeReader;
use crate::task::CopyJob;

/// Below this size, skip the extra `HeadObject` round trip and take the
/// ETag straight off the `GetObject` response.
pub const SMALL_OBJECT_HEAD_SKIP_THRESHOLD_BYTES: u64 = 5 * 1024 * 1024; // 5 MiB

/// Maximum length, in bytes, any propagated metadata value is truncated
/// to after sanitization.
const METADATA_VALUE_MAX_BYTES: usize = 1024;

/// Strip newline/control/non-printable characters and cap length.
fn sanitize_metadata_value(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| !c.is_control() && !c.is_whitespace() || *c == ' ')
        .collect();
    cleaned.chars().take(METADATA_VALUE_MAX_BYTES).collect()
}

/// Build the small, fixed metadata set propagated on a cross-account
/// copy: a source indicator, the source bucket/key identity, the
/// original name, and a migration timestamp. Content type is carried
/// separately via `put_object().content_type(..)`.
fn propagated_metadata(job: &CopyJob) -> std::collections::HashMap<String, String> {
    let mut metadata = std::collections::HashMap::new();
    metadata.insert("x-migration-source".to_string(), "s3migrate".to_string());
    metadata.insert(
        "x-migration-source-id".to_string(),
        sanitize_metadata_value(&format!("{}/{}", job.source_bucket, job.source_key)),
    );
    metadata.insert(
        "x-migration-original-name".to_string(),
        sanitize_metadata_value(
            job.source_key
                .rsplit('/')
                .next()
                .unwrap_or(&job.source_key),
        ),
    );
    metadata.insert(
        "x-migration-timestamp".to_string(),
        chrono::Utc::now().to_rfc3339(),
    );
    metadata
}

pub async fn copy_streaming(
    job: &CopyJob,
    source_pool: &Arc<ClientPool>,
    dest_pool: &Arc<ClientPool>,
    compute_hashes: bool,
) -> Result<CopyResult> {
    let source_client = source_pool.client(Selection::KeyHash(&job.source_key));

    let get_request = source_client
        .get_object()
        .bucket(&job.source_bucket)
        .key(&job.source_key);

    // Below the threshold we skip the extra HeadObject call entirely and
    // read content-type straight from the GetObject response below.
    let content_type = if job.size >= SMALL_OBJECT_HEAD_SKIP_THRESHOLD_BYTES {
        let head = source_client
            .head_object()
            .bucket(&job.source_bucket)
            .key(&job.source_key)
            .send()
            .await
            .map_err(|e| provider_error(source_pool, "head_object", e))?;
        head.content_type().map(str::to_string)
    } else {
        None
    };

    let response = get_request
        .send()
        .await
        .map_err(|e| provider_error(source_pool, "get_object", e))?;

    let source_etag = response.e_tag().map(str::to_string);
    let content_type = content_type.or_else(|| response.content_type().map(str::to_string));

    let reader = response.body.into_async_read();
    let mut tee = TeeReader::new(reader);
    let mut buffer = Vec::with_capacity(job.size as usize);
    tee.read_to_end(&mut buffer)
        .await
        .map_err(crate::error::MigrateError::Io)?;
    let hashes = if compute_hashes {
        Some(tee.into_hashes())
    } else {
        None
    };

    let dest_client = dest_pool.client(Selection::KeyHash(&job.dest_key));
    let mut put_request = dest_client
        .put_object()
        .bucket(&job.dest_bucket)
        .key(&job.dest_key)
        .body(ByteStream::from(buffer))
        .set_metadata(Some(propagated_metadata(job)));

    if let Some(content_type) = content_type {
        put_request = put_request.content_type(content_type);
    }

    let put_response = put_request
        .send()
        .await
        .map_err(|e| provider_error(dest_pool, "put_object", e))?;

    Ok(CopyResult {
        bytes: job.size,
        dest_etag: put_response.e_tag().map(str::to_string),
        source_etag,
        hashes,
    })
}

/// Zero-length objects skip body streaming entirely: some providers
/// reject a literal `Content-Length: 0` body, so this PUTs an empty
/// `ByteStream` without explicitly setting content-length.
pub async fn copy_empty_object(job: &CopyJob, dest_pool: &Arc<ClientPool>) -> Result<CopyResult> {
    let client = dest_pool.client(Selection::KeyHash(&job.dest_key));
    let response = client
        .put_object()
        .bucket(&job.dest_bucket)
        .key(&job.dest_key)
        .body(ByteStream::from(Vec::new()))
        .set_metadata(Some(propagated_metadata(job)))
        .send()
        .await
        .map_err(|e| provider_error(dest_pool, "put_object", e))?;

    // Zero-length objects are byte-identical by construction; the
    // destination ETag doubles as the source ETag the same way the
    // same-account strategies do.
    let dest_etag = response.e_tag().map(str::to_string);
    let source_etag = dest_etag.clone();

    Ok(CopyResult {
        bytes: 0,
        dest_etag,
        source_etag,
        hashes: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_newlines_and_control_characters() {
        let dirty = "line1\nline2\r\x07tab\tend";
        let clean = sanitize_metadata_value(dirty);
        assert!(!clean.contains('\n'));
        assert!(!clean.contains('\r'));
        assert!(!clean.contains('\u{7}'));
    }

    #[test]
    fn truncates_to_max_length() {
        let long = "a".repeat(METADATA_VALUE_MAX_BYTES + 500);
        let clean = sanitize_metadata_value(&long);
        assert_eq!(clean.chars().count(), METADATA_VALUE_MAX_BYTES);
    }

    #[test]
    fn metadata_set_includes_expected_fixed_keys() {
        let job = CopyJob {
            source_bucket: "src".to_string(),
            source_key: "dir/name.txt".to_string(),
            dest_bucket: "dst".to_string(),
            dest_key: "dir/name.txt".to_string(),
            size: 10,
        };
        let metadata = propagated_metadata(&job);
        assert_eq!(metadata.get("x-migration-original-name").unwrap(), "name.txt");
        assert!(metadata.contains_key("x-migration-source-id"));
        assert!(metadata.contains_key("x-migration-timestamp"));
    }
}
