//! Integrity Manager: compares source/destination ETag and size
//! after each copy, classifies the result, and persists it append-only.
//!
//! The persistence port is a trait (`IntegrityStore`): the relational
//! `integrity_results` table is an external collaborator; this crate
//! ships only the in-memory reference implementation plus the trait a
//! real service wires a database behind.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::hasher::Hashes;

/// One verified object, keyed by (task_id, object_key); never updated
/// after insertion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IntegrityResult {
    pub task_id: String,
    pub object_key: String,
    pub source_etag: Option<String>,
    pub dest_etag: Option<String>,
    pub source_size: u64,
    pub dest_size: u64,
    pub computed_md5: Option<String>,
    pub etag_match: bool,
    pub size_match: bool,
    pub is_valid: bool,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Strip surrounding quotes S3 ETags carry over the wire.
fn strip_quotes(etag: &str) -> &str {
    etag.trim_matches('"')
}

/// A reference-protocol multipart ETag looks like `"<hex>-<n>"`: the hex
/// part is not a plain MD5 of the whole object, so direct equality with a
/// single-part source ETag is expected to fail even when bytes match.
fn is_multipart_shaped(etag: &str) -> bool {
    let etag = strip_quotes(etag);
    match etag.rsplit_once('-') {
        Some((hex_part, suffix)) => {
            !hex_part.is_empty()
                && hex_part.chars().all(|c| c.is_ascii_hexdigit())
                && suffix.parse::<u32>().is_ok()
        }
        None => false,
    }
}

/// Build an [`IntegrityResult`] for one successfully copied object,
/// applying the matching rules below:
///
/// 1. `size_match` = source_size == dest_size.
/// 2. `etag_match` = lexical equality after stripping quotes.
/// 3. `is_valid` = size_match && (etag_match || (source ETag is
///    multipart-shaped && size_match)); a matching MD5 from streaming
///    hashes promotes to valid regardless of ETag.
pub fn evaluate(
    task_id: &str,
    object_key: &str,
    source_etag: Option<&str>,
    dest_etag: Option<&str>,
    source_size: u64,
    dest_size: u64,
    computed_hashes: Option<&Hashes>,
) -> IntegrityResult {
    let size_match = source_size == dest_size;

    let etag_match = match (source_etag, dest_etag) {
        (Some(s), Some(d)) => strip_quotes(s) == strip_quotes(d),
        _ => false,
    };

    let multipart_accommodation =
        size_match && source_etag.map(is_multipart_shaped).unwrap_or(false);

    let hash_promotion = computed_hashes
        .zip(dest_etag)
        .map(|(hashes, dest)| strip_quotes(dest) == hashes.md5_hex)
        .unwrap_or(false);

    let is_valid = size_match && (etag_match || multipart_accommodation || hash_promotion);

    IntegrityResult {
        task_id: task_id.to_string(),
        object_key: object_key.to_string(),
        source_etag: source_etag.map(str::to_string),
        dest_etag: dest_etag.map(str::to_string),
        source_size,
        dest_size,
        computed_md5: computed_hashes.map(|h| h.md5_hex.clone()),
        etag_match,
        size_match,
        is_valid,
        error: None,
        recorded_at: Utc::now(),
    }
}

/// Append-only persistence port for integrity results.
#[async_trait]
pub trait IntegrityStore: Send + Sync {
    async fn append(&self, result: IntegrityResult) -> Result<()>;
    async fn list_for_task(&self, task_id: &str) -> Result<Vec<IntegrityResult>>;
    async fn summary(&self, task_id: &str) -> Result<IntegritySummary>;
}

/// Aggregate verified/failed counts for a task.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct IntegritySummary {
    pub verified: u64,
    pub failed: u64,
}

impl IntegritySummary {
    pub fn rate(&self) -> f64 {
        let total = self.verified + self.failed;
        if total == 0 {
            0.0
        } else {
            self.verified as f64 / total as f64
        }
    }
}

/// In-memory reference `IntegrityStore`. A production deployment swaps
/// this for a Postgres-backed implementation against the `integrity_results`
/// table; out of scope for this crate.
#[derive(Default)]
pub struct InMemoryIntegrityStore {
    rows: Mutex<Vec<IntegrityResult>>,
}

impl InMemoryIntegrityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IntegrityStore for InMemoryIntegrityStore {
    async fn append(&self, result: IntegrityResult) -> Result<()> {
        debug!(
            task_id = %result.task_id,
            key = %result.object_key,
            is_valid = result.is_valid,
            "recorded integrity result"
        );
        self.rows.lock().await.push(result);
        Ok(())
    }

    async fn list_for_task(&self, task_id: &str) -> Result<Vec<IntegrityResult>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn summary(&self, task_id: &str) -> Result<IntegritySummary> {
        let rows = self.list_for_task(task_id).await?;
        let verified = rows.iter().filter(|r| r.is_valid).count() as u64;
        let failed = rows.len() as u64 - verified;
        Ok(IntegritySummary { verified, failed })
    }
}

/// Persists a result via `store`, logging (but not propagating) a failure
/// to persist: persistence failures never fail the copy whose integrity
/// they record.
pub async fn persist_best_effort(store: &Arc<dyn IntegrityStore>, result: IntegrityResult) {
    let task_id = result.task_id.clone();
    let key = result.object_key.clone();
    if let Err(err) = store.append(result).await {
        warn!(task_id = %task_id, key = %key, error = %err, "failed to persist integrity result");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_single_part_etags_are_valid() {
        let result = evaluate(
            "t1",
            "a.txt",
            Some("\"abc123\""),
            Some("\"abc123\""),
            10,
            10,
            None,
        );
        assert!(result.is_valid);
        assert!(result.etag_match);
        assert!(result.size_match);
    }

    #[test]
    fn multipart_shaped_source_etag_accommodated() {
        let result = evaluate(
            "t1",
            "big.bin",
            Some("\"9f86d081884c7d659a2feaa0c55ad015-21\""),
            Some("\"completely-different-dest-etag\""),
            100,
            100,
            None,
        );
        assert!(result.is_valid, "size matches and source etag is multipart-shaped");
    }

    #[test]
    fn size_mismatch_is_never_valid_even_with_matching_etag() {
        let result = evaluate("t1", "a.txt", Some("\"x\""), Some("\"x\""), 10, 8, None);
        assert!(!result.is_valid);
        assert!(!result.size_match);
    }

    #[test]
    fn matching_md5_promotes_despite_etag_mismatch() {
        let hashes = Hashes {
            md5_hex: "deadbeef".to_string(),
            sha1_hex: String::new(),
            sha256_hex: String::new(),
            crc32: 0,
            size: 4,
        };
        let result = evaluate(
            "t1",
            "a.txt",
            Some("\"other-etag\""),
            Some("\"deadbeef\""),
            4,
            4,
            Some(&hashes),
        );
        assert!(result.is_valid);
        assert!(!result.etag_match);
    }

    #[tokio::test]
    async fn store_summary_counts_valid_and_invalid() {
        let store = InMemoryIntegrityStore::new();
        store
            .append(evaluate("t1", "a", Some("\"x\""), Some("\"x\""), 1, 1, None))
            .await
            .unwrap();
        store
            .append(evaluate("t1", "b", Some("\"x\""), Some("\"y\""), 1, 1, None))
            .await
            .unwrap();

        let summary = store.summary("t1").await.unwrap();
        assert_eq!(summary.verified, 1);
        assert_eq!(summary.failed, 1);
        assert!((summary.rate() - 0.5).abs() < f64::EPSILON);
    }
}
