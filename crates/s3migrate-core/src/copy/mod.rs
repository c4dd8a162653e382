//! Copy Strategies: same-account simple copy, same-account
//! multipart range copy, cross-account streaming copy, and the
//! zero-length special case.
//!
//! Dispatch is a pure function of (size, separate-dest-creds?, size == 0)
//! returning a tagged variant, kept separate from the strategies
//! themselves so the decision is trivially testable without a live
//! endpoint.

pub mod multipart;
pub mod simple;
pub mod streaming;

use std::sync::Arc;

use crate::client_pool::ClientPool;
use crate::error::Result;
use crate::task::CopyJob;

/// Threshold above which a same-account copy must use the multipart range
/// strategy instead of a single server-side copy.
pub const MULTIPART_THRESHOLD_BYTES: u64 = 1024 * 1024 * 1024; // 1 GiB

/// Which strategy handles one job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    Simple,
    MultipartRange,
    CrossAccountStream,
    EmptyObject,
}

/// Pure dispatch function: `(size, separate_dest_creds?, size == 0)`.
pub fn dispatch(size: u64, has_separate_dest_credentials: bool) -> Strategy {
    if size == 0 {
        return Strategy::EmptyObject;
    }
    if has_separate_dest_credentials {
        return Strategy::CrossAccountStream;
    }
    if size >= MULTIPART_THRESHOLD_BYTES {
        Strategy::MultipartRange
    } else {
        Strategy::Simple
    }
}

/// Bytes successfully transferred and, when integrity is enabled, the
/// hashes computed along the way (only produced by the streaming strategy;
/// server-side copies never see the bytes).
pub struct CopyResult {
    pub bytes: u64,
    pub dest_etag: Option<String>,
    pub source_etag: Option<String>,
    pub hashes: Option<crate::hasher::Hashes>,
}

/// Run one job to completion using whichever strategy `dispatch` selects,
/// given the pools for the source and (when cross-account) destination
/// endpoints.
pub async fn execute(
    job: &CopyJob,
    source_pool: &Arc<ClientPool>,
    dest_pool: &Arc<ClientPool>,
    has_separate_dest_credentials: bool,
    compute_hashes: bool,
) -> Result<CopyResult> {
    match dispatch(job.size, has_separate_dest_credentials) {
        Strategy::EmptyObject => streaming::copy_empty_object(job, dest_pool).await,
        Strategy::CrossAccountStream => {
            streaming::copy_streaming(job, source_pool, dest_pool, compute_hashes).await
        }
        Strategy::MultipartRange => multipart::copy_multipart(job, dest_pool).await,
        Strategy::Simple => simple::copy_simple(job, dest_pool).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_always_wins_the_dispatch() {
        assert_eq!(dispatch(0, true), Strategy::EmptyObject);
        assert_eq!(dispatch(0, false), Strategy::EmptyObject);
    }

    #[test]
    fn separate_dest_credentials_force_streaming() {
        assert_eq!(dispatch(10, true), Strategy::CrossAccountStream);
        assert_eq!(dispatch(MULTIPART_THRESHOLD_BYTES * 2, true), Strategy::CrossAccountStream);
    }

    #[test]
    fn large_same_account_objects_use_multipart() {
        assert_eq!(dispatch(MULTIPART_THRESHOLD_BYTES, false), Strategy::MultipartRange);
        assert_eq!(dispatch(MULTIPART_THRESHOLD_BYTES - 1, false), Strategy::Simple);
    }
}
