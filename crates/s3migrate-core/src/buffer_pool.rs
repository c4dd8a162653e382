//! Buffer Pool: fixed-size reusable byte buffers with an allocation
//! cap, plus a multi-size variant that indexes several single-size pools.

use std::sync::atomic::{AtomicUsize, Ordering};
use parking_lot::Mutex;

/// A pool of byte buffers all of one size.
pub struct BufferPool {
    size: usize,
    cap: usize,
    free: Mutex<Vec<Vec<u8>>>,
    untracked_allocations: AtomicUsize,
}

impl BufferPool {
    /// `size` is the buffer length handed out by [`get`](Self::get). `cap`
    /// is the maximum number of buffers retained for reuse; `get` beyond
    /// that allocates outside the pool and is never returned by `put`.
    pub fn new(size: usize, cap: usize) -> Self {
        Self {
            size,
            cap,
            free: Mutex::new(Vec::with_capacity(cap)),
            untracked_allocations: AtomicUsize::new(0),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.size
    }

    /// Get a buffer of `self.size` bytes, reused from the pool when one is
    /// available.
    pub fn get(&self) -> Vec<u8> {
        if let Some(mut buf) = self.free.lock().pop() {
            buf.clear();
            buf.resize(self.size, 0);
            return buf;
        }
        self.untracked_allocations.fetch_add(1, Ordering::Relaxed);
        vec![0u8; self.size]
    }

    /// Return a buffer for reuse. Buffers whose capacity doesn't match
    /// `self.size`, or that arrive once the pool is already at `cap`, are
    /// dropped instead of retained.
    pub fn put(&self, buf: Vec<u8>) {
        if buf.capacity() != self.size {
            return;
        }
        let mut free = self.free.lock();
        if free.len() < self.cap {
            free.push(buf);
        }
    }

    /// Number of buffers allocated outside the pool because `cap` was
    /// already reached (untracked — never returned to the pool).
    pub fn untracked_allocations(&self) -> usize {
        self.untracked_allocations.load(Ordering::Relaxed)
    }
}

/// Several [`BufferPool`]s indexed by size; `get` picks the smallest pool
/// whose buffer size is `>=` the request.
pub struct MultiSizeBufferPool {
    pools: Vec<BufferPool>,
}

impl MultiSizeBufferPool {
    /// `sizes` need not be sorted; they are sorted ascending internally.
    pub fn new(mut sizes: Vec<usize>, cap_per_size: usize) -> Self {
        sizes.sort_unstable();
        sizes.dedup();
        let pools = sizes
            .into_iter()
            .map(|size| BufferPool::new(size, cap_per_size))
            .collect();
        Self { pools }
    }

    /// Get a buffer at least `requested` bytes long. Falls back to an
    /// untracked allocation of exactly `requested` bytes if no configured
    /// pool is large enough.
    pub fn get(&self, requested: usize) -> Vec<u8> {
        match self.pools.iter().find(|p| p.buffer_size() >= requested) {
            Some(pool) => pool.get(),
            None => vec![0u8; requested],
        }
    }

    /// Return a buffer to the pool matching its exact capacity, if any.
    pub fn put(&self, buf: Vec<u8>) {
        if let Some(pool) = self.pools.iter().find(|p| p.buffer_size() == buf.capacity()) {
            pool.put(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_buffers_within_cap() {
        let pool = BufferPool::new(1024, 2);
        let a = pool.get();
        let b = pool.get();
        assert_eq!(a.len(), 1024);
        pool.put(a);
        pool.put(b);
        // A third get reuses a returned buffer instead of allocating.
        let allocations_before = pool.untracked_allocations();
        let _c = pool.get();
        assert_eq!(pool.untracked_allocations(), allocations_before);
    }

    #[test]
    fn mismatched_capacity_is_dropped() {
        let pool = BufferPool::new(1024, 4);
        let wrong = vec![0u8; 256];
        pool.put(wrong);
        assert_eq!(pool.free.lock().len(), 0);
    }

    #[test]
    fn exceeding_cap_allocates_untracked() {
        let pool = BufferPool::new(64, 1);
        let a = pool.get();
        let b = pool.get();
        assert_eq!(pool.untracked_allocations(), 1);
        pool.put(a);
        pool.put(b); // second put dropped, free list already at cap
        assert_eq!(pool.free.lock().len(), 1);
    }

    #[test]
    fn multi_size_picks_smallest_fitting_pool() {
        let pool = MultiSizeBufferPool::new(vec![4096, 65536, 1024], 2);
        let buf = pool.get(2000);
        assert_eq!(buf.len(), 4096);
        let buf2 = pool.get(100_000);
        assert_eq!(buf2.len(), 100_000); // no pool big enough, untracked
    }
}
