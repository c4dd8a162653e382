//! Memory Manager: reads a process memory ceiling, estimates
//! memory-per-worker from observed usage, and computes a safe worker
//! ceiling.
//!
//! The per-worker default is fixed at `DEFAULT_PER_WORKER_BYTES` (64 MiB),
//! a single conservative value used as the EMA's starting point before
//! any job has completed and supplied a measured estimate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sysinfo::{Pid, System};
use tracing::{debug, warn};

/// Conservative default memory footprint of one worker before any
/// observed-usage samples arrive.
pub const DEFAULT_PER_WORKER_BYTES: u64 = 64 * 1024 * 1024;

/// Fallback ceiling used when the runtime cannot report one.
const DEFAULT_CEILING_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Fraction of the ceiling considered safe to use.
const SAFE_BUDGET_FRACTION: f64 = 0.85;

/// Minimum time between worker-count adjustments.
const ADJUSTMENT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum workers added in a single adjustment.
const MAX_STEP_UP: usize = 2;

struct Ema {
    value: f64,
    initialized: bool,
}

impl Ema {
    /// Smoothing factor for the per-worker memory estimate; a short
    /// history (`alpha` closer to 1) reacts quickly to workload shifts.
    const ALPHA: f64 = 0.3;

    fn new(seed: f64) -> Self {
        Self {
            value: seed,
            initialized: false,
        }
    }

    fn update(&mut self, sample: f64) {
        if !self.initialized {
            self.value = sample;
            self.initialized = true;
        } else {
            self.value = Self::ALPHA * sample + (1.0 - Self::ALPHA) * self.value;
        }
    }
}

/// Computes safe worker ceilings from process memory pressure.
pub struct MemoryManager {
    min_workers: usize,
    max_workers: usize,
    ceiling_bytes: u64,
    per_worker: Mutex<Ema>,
    last_adjustment: Mutex<Option<Instant>>,
    gc_triggers: AtomicU64,
    pid: Pid,
}

impl MemoryManager {
    pub fn new(min_workers: usize, max_workers: usize) -> Self {
        let mut system = System::new();
        system.refresh_memory();
        let ceiling_bytes = system.total_memory().max(DEFAULT_CEILING_BYTES);

        Self {
            min_workers: min_workers.max(1),
            max_workers: max_workers.max(min_workers.max(1)),
            ceiling_bytes,
            per_worker: Mutex::new(Ema::new(DEFAULT_PER_WORKER_BYTES as f64)),
            last_adjustment: Mutex::new(None),
            gc_triggers: AtomicU64::new(0),
            pid: sysinfo::get_current_pid().unwrap_or(Pid::from(0)),
        }
    }

    pub fn ceiling_bytes(&self) -> u64 {
        self.ceiling_bytes
    }

    pub fn safe_budget_bytes(&self) -> u64 {
        (self.ceiling_bytes as f64 * SAFE_BUDGET_FRACTION) as u64
    }

    /// Feed an observed per-worker memory sample (bytes) into the moving
    /// average. Call this periodically from the engine with
    /// `current_process_memory() / active_workers`.
    pub fn record_worker_memory_sample(&self, bytes: f64) {
        self.per_worker.lock().update(bytes);
    }

    fn per_worker_estimate(&self) -> f64 {
        self.per_worker.lock().value
    }

    /// Read the process's current resident memory via `sysinfo`.
    pub fn current_allocation(&self) -> u64 {
        let mut system = System::new();
        system.refresh_all();
        system.process(self.pid).map(|p| p.memory()).unwrap_or(0)
    }

    /// Compute the optimal worker count given `configured_max` and
    /// `current_workers`:
    /// - never add more than `MAX_STEP_UP` workers per adjustment;
    /// - never fall below `min_workers`;
    /// - if current allocation exceeds the safe budget, decrement and
    ///   force GC;
    /// - rate-limited to one adjustment per `ADJUSTMENT_INTERVAL`.
    pub fn optimal_workers(&self, configured_max: usize, current_workers: usize) -> usize {
        let mut last = self.last_adjustment.lock();
        if let Some(last_at) = *last {
            if last_at.elapsed() < ADJUSTMENT_INTERVAL {
                return current_workers.max(self.min_workers);
            }
        }

        let current_alloc = self.current_allocation();
        let safe_budget = self.safe_budget_bytes();

        let next = if current_alloc as f64 > safe_budget as f64 {
            self.gc_triggers.fetch_add(1, Ordering::Relaxed);
            warn!(
                current_alloc,
                safe_budget, "current allocation exceeds safe budget, forcing GC and backing off"
            );
            self.force_gc();
            current_workers.saturating_sub(1).max(self.min_workers)
        } else {
            let per_worker = self.per_worker_estimate().max(1.0);
            let headroom = (safe_budget as f64 - current_alloc as f64).max(0.0);
            let affordable = (headroom / per_worker).floor() as usize;
            let target = affordable.min(configured_max).min(self.max_workers);
            let capped_step = current_workers.saturating_add(MAX_STEP_UP);
            target.min(capped_step).max(self.min_workers)
        };

        debug!(current_workers, next, "memory manager adjustment");
        *last = Some(Instant::now());
        next
    }

    /// Hook for a caller-supplied GC trigger. In Rust there is no runtime
    /// GC to force; this records the intent so the engine can react (e.g.
    /// by dropping cached buffers) and is observable for tests/metrics.
    fn force_gc(&self) {
        // No-op beyond bookkeeping: Rust has no garbage collector to
        // trigger. The engine observes `gc_triggers()` and sheds buffer
        // pool slack in response.
    }

    pub fn gc_triggers(&self) -> u64 {
        self.gc_triggers.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with_ceiling(min: usize, max: usize, ceiling: u64) -> MemoryManager {
        let m = MemoryManager::new(min, max);
        MemoryManager {
            ceiling_bytes: ceiling,
            ..m
        }
    }

    #[test]
    fn never_drops_below_min_workers() {
        let manager = manager_with_ceiling(2, 50, 1024 * 1024 * 1024);
        let workers = manager.optimal_workers(50, 2);
        assert!(workers >= 2);
    }

    #[test]
    fn step_up_is_capped_at_two() {
        let manager = manager_with_ceiling(1, 100, 64 * 1024 * 1024 * 1024);
        let workers = manager.optimal_workers(100, 5);
        assert!(workers <= 7);
    }

    #[test]
    fn default_per_worker_estimate_is_conservative() {
        assert_eq!(DEFAULT_PER_WORKER_BYTES, 64 * 1024 * 1024);
    }
}
