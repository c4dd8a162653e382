//! Delta Planner: in incremental mode, joins source and destination
//! listings to compute the set of objects that actually need copying.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::lister::ObjectRef;

/// Copy/skip decision for a single source object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Copy,
    Skip,
}

#[derive(Clone, Copy)]
struct DestEntry {
    size: u64,
    last_modified: Option<DateTime<Utc>>,
}

/// Strips `prefix` from `key` if present, otherwise returns `key`
/// unchanged (mirrors the planner's prefix-stripping join key).
fn strip_prefix<'a>(key: &'a str, prefix: &str) -> &'a str {
    key.strip_prefix(prefix).unwrap_or(key)
}

/// Decide, per source object, whether it needs copying against a listed
/// destination. `dest_listing` is `None` when the destination listing
/// itself failed — callers should treat that as "fall back to full
/// rewrite" rather than calling this function per-object.
pub fn plan_incremental(
    source_objects: &[ObjectRef],
    source_prefix: &str,
    dest_objects: &[ObjectRef],
    dest_prefix: &str,
) -> Vec<(ObjectRef, Decision)> {
    let mut dest_by_key: HashMap<&str, DestEntry> = HashMap::with_capacity(dest_objects.len());
    for obj in dest_objects {
        dest_by_key.insert(
            strip_prefix(&obj.key, dest_prefix),
            DestEntry {
                size: obj.size,
                last_modified: obj.last_modified,
            },
        );
    }

    source_objects
        .iter()
        .map(|source| {
            let stripped = strip_prefix(&source.key, source_prefix);
            let decision = match dest_by_key.get(stripped) {
                None => Decision::Copy,
                Some(dest) => {
                    let size_differs = dest.size != source.size;
                    let source_is_newer = match (source.last_modified, dest.last_modified) {
                        (Some(src), Some(dst)) => src > dst,
                        // No mtime on one side: can't prove staleness, don't force a copy.
                        _ => false,
                    };
                    if size_differs || source_is_newer {
                        Decision::Copy
                    } else {
                        Decision::Skip
                    }
                }
            };
            (source.clone(), decision)
        })
        .collect()
}

/// Migration mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationMode {
    FullRewrite,
    Incremental,
}

/// Computes the copy set for either mode. In `FullRewrite` mode every
/// source object is copied, short-circuiting the destination join
/// entirely. In `Incremental` mode, a destination listing failure falls
/// back to full rewrite with a recorded warning.
pub fn plan(
    mode: MigrationMode,
    source_objects: &[ObjectRef],
    source_prefix: &str,
    dest_listing: Option<&[ObjectRef]>,
    dest_prefix: &str,
) -> Vec<ObjectRef> {
    match mode {
        MigrationMode::FullRewrite => source_objects.to_vec(),
        MigrationMode::Incremental => match dest_listing {
            Some(dest_objects) => plan_incremental(source_objects, source_prefix, dest_objects, dest_prefix)
                .into_iter()
                .filter(|(_, decision)| *decision == Decision::Copy)
                .map(|(obj, _)| obj)
                .collect(),
            None => {
                warn!("destination listing unavailable; falling back to full rewrite");
                source_objects.to_vec()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(key: &str, size: u64, mtime: Option<DateTime<Utc>>) -> ObjectRef {
        ObjectRef {
            key: key.to_string(),
            size,
            last_modified: mtime,
        }
    }

    #[test]
    fn absent_destination_object_is_copied() {
        let source = vec![obj("a", 10, None)];
        let decisions = plan_incremental(&source, "", &[], "");
        assert_eq!(decisions[0].1, Decision::Copy);
    }

    #[test]
    fn matching_size_and_mtime_is_skipped() {
        let t = Utc::now();
        let source = vec![obj("a", 10, Some(t))];
        let dest = vec![obj("a", 10, Some(t))];
        let decisions = plan_incremental(&source, "", &dest, "");
        assert_eq!(decisions[0].1, Decision::Skip);
    }

    #[test]
    fn differing_size_forces_copy() {
        let t = Utc::now();
        let source = vec![obj("a", 10, Some(t))];
        let dest = vec![obj("a", 8, Some(t))];
        let decisions = plan_incremental(&source, "", &dest, "");
        assert_eq!(decisions[0].1, Decision::Copy);
    }

    #[test]
    fn strictly_newer_source_mtime_forces_copy() {
        let t = Utc::now();
        let later = t + chrono::Duration::seconds(1);
        let source = vec![obj("a", 10, Some(later))];
        let dest = vec![obj("a", 10, Some(t))];
        let decisions = plan_incremental(&source, "", &dest, "");
        assert_eq!(decisions[0].1, Decision::Copy);
    }

    #[test]
    fn prefixes_are_stripped_before_joining() {
        let t = Utc::now();
        let source = vec![obj("src/a", 10, Some(t))];
        let dest = vec![obj("dst/a", 10, Some(t))];
        let decisions = plan_incremental(&source, "src/", &dest, "dst/");
        assert_eq!(decisions[0].1, Decision::Skip);
    }

    #[test]
    fn full_rewrite_copies_everything_regardless_of_destination() {
        let t = Utc::now();
        let source = vec![obj("a", 10, Some(t)), obj("b", 5, Some(t))];
        let dest = vec![obj("a", 10, Some(t)), obj("b", 5, Some(t))];
        let result = plan(MigrationMode::FullRewrite, &source, "", Some(&dest), "");
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn failed_destination_listing_falls_back_to_full_rewrite() {
        let source = vec![obj("a", 10, None), obj("b", 5, None)];
        let result = plan(MigrationMode::Incremental, &source, "", None, "");
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn incremental_no_op_yields_empty_copy_set() {
        let t = Utc::now();
        let source = vec![obj("a", 10, Some(t)), obj("b", 5, Some(t))];
        let dest = source.clone();
        let result = plan(MigrationMode::Incremental, &source, "", Some(&dest), "");
        assert!(result.is_empty());
    }
}
