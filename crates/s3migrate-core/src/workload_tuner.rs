//! Workload Tuner: classifies the object-size histogram into a
//! pattern, maintains a rolling window of throughput samples, and derives
//! an optimal worker count from both the samples and the Network Monitor.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::network_monitor::{NetworkMonitor, Quality};

const ONE_MB: u64 = 1024 * 1024;
const LARGE_FILE_THRESHOLD: u64 = 100 * ONE_MB;
const SAMPLE_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Workload shape, classified from a size histogram.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkloadPattern {
    ManySmall,
    LargeFiles,
    Mixed,
}

/// Per-pattern worker bounds.
#[derive(Clone, Copy, Debug)]
pub struct WorkerConfig {
    pub min: usize,
    pub max: usize,
    pub default: usize,
}

impl WorkloadPattern {
    pub fn worker_config(self) -> WorkerConfig {
        match self {
            WorkloadPattern::ManySmall => WorkerConfig {
                min: 20,
                max: 200,
                default: 100,
            },
            WorkloadPattern::LargeFiles => WorkerConfig {
                min: 2,
                max: 20,
                default: 8,
            },
            WorkloadPattern::Mixed => WorkerConfig {
                min: 5,
                max: 100,
                default: 30,
            },
        }
    }
}

/// A histogram of object sizes (bytes per object) observed at listing time.
#[derive(Default)]
pub struct SizeHistogram {
    pub total_objects: u64,
    pub total_bytes: u64,
    pub small_objects: u64, // < 1 MiB
    pub small_bytes: u64,
    pub large_objects: u64, // > 100 MiB
    pub large_bytes: u64,
}

impl SizeHistogram {
    pub fn observe(&mut self, size: u64) {
        self.total_objects += 1;
        self.total_bytes += size;
        if size < ONE_MB {
            self.small_objects += 1;
            self.small_bytes += size;
        }
        if size > LARGE_FILE_THRESHOLD {
            self.large_objects += 1;
            self.large_bytes += size;
        }
    }

    pub fn classify(&self) -> WorkloadPattern {
        if self.total_objects == 0 {
            return WorkloadPattern::Mixed;
        }
        let small_byte_share = self.small_bytes as f64 / self.total_bytes.max(1) as f64;
        let small_object_share = self.small_objects as f64 / self.total_objects as f64;
        if small_byte_share >= 0.8 && small_object_share >= 0.8 {
            return WorkloadPattern::ManySmall;
        }
        let large_byte_share = self.large_bytes as f64 / self.total_bytes.max(1) as f64;
        if large_byte_share > 0.2 {
            return WorkloadPattern::LargeFiles;
        }
        WorkloadPattern::Mixed
    }
}

#[derive(Clone, Copy)]
struct PerformanceSample {
    at: Instant,
    speed_mb_s: f64,
    workers: usize,
}

/// How many samples must accumulate, and how much time must pass since the
/// last adjustment, before `optimal_workers` recomputes (rather than
/// returning the previous value unchanged).
pub struct AdjustmentGate {
    pub min_samples: usize,
    pub min_interval: Duration,
}

impl Default for AdjustmentGate {
    fn default() -> Self {
        Self {
            min_samples: 5,
            min_interval: Duration::from_secs(30),
        }
    }
}

/// Adjusts worker counts from measured throughput over time.
pub struct WorkloadTuner {
    pattern: Mutex<WorkloadPattern>,
    samples: Mutex<Vec<PerformanceSample>>,
    last_adjustment: Mutex<Option<Instant>>,
    gate: AdjustmentGate,
}

impl WorkloadTuner {
    pub fn new(histogram: &SizeHistogram) -> Self {
        Self {
            pattern: Mutex::new(histogram.classify()),
            samples: Mutex::new(Vec::new()),
            last_adjustment: Mutex::new(None),
            gate: AdjustmentGate::default(),
        }
    }

    pub fn pattern(&self) -> WorkloadPattern {
        *self.pattern.lock()
    }

    /// Record an observed `(speed, worker count)` sample for the given
    /// file size. Only samples within the last five minutes are retained.
    pub fn record_performance(&self, speed_mb_s: f64, workers: usize, _file_size: u64) {
        let now = Instant::now();
        let mut samples = self.samples.lock();
        samples.push(PerformanceSample {
            at: now,
            speed_mb_s,
            workers,
        });
        samples.retain(|s| now.duration_since(s.at) <= SAMPLE_WINDOW);
    }

    fn bucket_averages(&self) -> HashMap<usize, f64> {
        let samples = self.samples.lock();
        let mut sums: HashMap<usize, (f64, usize)> = HashMap::new();
        for sample in samples.iter() {
            let entry = sums.entry(sample.workers).or_insert((0.0, 0));
            entry.0 += sample.speed_mb_s;
            entry.1 += 1;
        }
        sums.into_iter()
            .map(|(workers, (sum, count))| (workers, sum / count as f64))
            .collect()
    }

    /// Compute the next worker target, combining bucketed throughput
    /// samples with the network monitor's recommendation, then clamping
    /// to the pattern's bounds and the +2/-1 step rule.
    pub fn optimal_workers(
        &self,
        current_workers: usize,
        network: &NetworkMonitor,
    ) -> usize {
        let config = self.pattern().worker_config();

        let mut last = self.last_adjustment.lock();
        let samples_len = self.samples.lock().len();
        if samples_len < self.gate.min_samples {
            return current_workers.clamp(config.min, config.max);
        }
        if let Some(last_at) = *last {
            if last_at.elapsed() < self.gate.min_interval {
                return current_workers.clamp(config.min, config.max);
            }
        }

        let averages = self.bucket_averages();
        let best_bucket = averages
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(workers, _)| *workers)
            .unwrap_or(config.default);

        let pattern_biased = match self.pattern() {
            WorkloadPattern::ManySmall => best_bucket + best_bucket / 5, // bias up
            WorkloadPattern::LargeFiles => best_bucket.min(config.max / 2),
            WorkloadPattern::Mixed => {
                let discount = 0.3 * (best_bucket as f64 / config.max as f64);
                ((best_bucket as f64) * (1.0 - discount)).round() as usize
            }
        };

        let network_recommendation = network.optimal_concurrency(config.default);
        let combined = match network.quality() {
            Quality::Poor | Quality::Fair => network_recommendation,
            Quality::Good | Quality::Excellent => (pattern_biased + network_recommendation) / 2,
        };

        let bounded = combined.clamp(config.min, config.max);
        let step_capped = bounded
            .min(current_workers + 2)
            .max(current_workers.saturating_sub(1));
        let next = step_capped.clamp(config.min, config.max);

        *last = Some(Instant::now());
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_many_small() {
        let mut hist = SizeHistogram::default();
        for _ in 0..100 {
            hist.observe(10 * 1024);
        }
        assert_eq!(hist.classify(), WorkloadPattern::ManySmall);
    }

    #[test]
    fn classifies_large_files() {
        let mut hist = SizeHistogram::default();
        hist.observe(500 * ONE_MB);
        hist.observe(1024);
        assert_eq!(hist.classify(), WorkloadPattern::LargeFiles);
    }

    #[test]
    fn classifies_mixed_by_default() {
        let mut hist = SizeHistogram::default();
        hist.observe(50 * ONE_MB);
        hist.observe(1024);
        assert_eq!(hist.classify(), WorkloadPattern::Mixed);
    }

    #[test]
    fn never_jumps_by_more_than_two_workers() {
        let hist = SizeHistogram::default();
        let tuner = WorkloadTuner::new(&hist);
        let network = NetworkMonitor::new();
        network.record_sample(std::time::Duration::from_millis(900), 1.0, 0.1);
        for _ in 0..5 {
            tuner.record_performance(50.0, 40, 1024);
        }
        let next = tuner.optimal_workers(10, &network);
        assert!(next <= 12);
    }

    #[test]
    fn below_sample_threshold_holds_current() {
        let hist = SizeHistogram::default();
        let tuner = WorkloadTuner::new(&hist);
        let network = NetworkMonitor::new();
        let next = tuner.optimal_workers(10, &network);
        assert_eq!(next, 10);
    }
}
