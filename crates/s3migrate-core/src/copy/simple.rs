//! Same-account server-side copy: one `CopyObject` call, no bytes
//! transferred through the engine.

use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::client_pool::{provider_error, ClientPool, Selection};
use crate::copy::CopyResult;
use crate::error::Result;
use crate::task::CopyJob;

/// Characters requiring percent-encoding in the key segment of a
/// `CopySource`: everything a key could legally contain that is not safe
/// unescaped in a header value (space, `+`, `?`, and non-ASCII bytes).
const COPY_SOURCE_KEY_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'+')
    .add(b'?')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'`');

/// `"{bucket}/" + percent_encode_path(key)` — the bucket and separator are
/// left untouched, only the key is encoded.
pub fn copy_source(bucket: &str, key: &str) -> String {
    format!(
        "{bucket}/{}",
        utf8_percent_encode(key, COPY_SOURCE_KEY_ENCODE_SET)
    )
}

pub async fn copy_simple(job: &CopyJob, dest_pool: &Arc<ClientPool>) -> Result<CopyResult> {
    let client = dest_pool.client(Selection::KeyHash(&job.dest_key));
    let source = copy_source(&job.source_bucket, &job.source_key);

    let response = client
        .copy_object()
        .bucket(&job.dest_bucket)
        .key(&job.dest_key)
        .copy_source(&source)
        .send()
        .await
        .map_err(|e| provider_error(dest_pool, "copy_object", e))?;

    let dest_etag = response
        .copy_object_result()
        .and_then(|r| r.e_tag())
        .map(str::to_string);

    // Server-side `CopyObject` is byte-exact: the destination content is
    // identical to the source, so the destination ETag doubles as the
    // source ETag for integrity purposes without a separate HeadObject.
    let source_etag = dest_etag.clone();

    Ok(CopyResult {
        bytes: job.size,
        dest_etag,
        source_etag,
        hashes: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_spaces_plus_and_question_marks() {
        let source = copy_source("my-bucket", "a folder/file+name?v=2.txt");
        assert_eq!(
            source,
            "my-bucket/a%20folder/file%2Bname%3Fv=2.txt"
        );
    }

    #[test]
    fn leaves_bucket_and_separator_untouched() {
        let source = copy_source("my bucket", "plain-key");
        assert!(source.starts_with("my bucket/"));
    }

    #[test]
    fn encodes_non_ascii_utf8_bytes() {
        let source = copy_source("b", "café/日本語.txt");
        assert!(!source.contains('é'));
        assert!(!source.contains('日'));
    }
}
