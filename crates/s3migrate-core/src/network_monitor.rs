//! Network Monitor: tracks the last-sampled latency/throughput/error
//! rate and classifies quality in {excellent, good, fair, poor}, used to
//! scale concurrency and chunk sizes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Quality bucket derived from latency thresholds only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Quality {
    fn from_latency(latency: Duration) -> Self {
        let ms = latency.as_millis();
        if ms < 50 {
            Quality::Excellent
        } else if ms < 100 {
            Quality::Good
        } else if ms < 500 {
            Quality::Fair
        } else {
            Quality::Poor
        }
    }

    /// Scale factor applied to a base concurrency or chunk size.
    pub fn scale_factor(self) -> f64 {
        match self {
            Quality::Excellent => 2.0,
            Quality::Good => 1.5,
            Quality::Fair => 1.0,
            Quality::Poor => 0.5,
        }
    }

    /// Retry delay scales inversely with quality: worse network, longer
    /// backoff before the next attempt.
    pub fn retry_delay_scale(self) -> f64 {
        1.0 / self.scale_factor()
    }
}

#[derive(Clone, Copy, Debug)]
struct Sample {
    latency: Duration,
    throughput_mb_s: f64,
    error_rate: f64,
    sampled_at_elapsed: Duration,
}

/// How stale a sample can be before callers are told to re-probe, though
/// it is still used.
const STALE_AFTER: Duration = Duration::from_secs(30);

/// Holds the most recent network sample and derives recommendations.
pub struct NetworkMonitor {
    started: Instant,
    sample: RwLock<Option<Sample>>,
    probes: AtomicU64,
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkMonitor {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            sample: RwLock::new(None),
            probes: AtomicU64::new(0),
        }
    }

    /// Record a fresh sample (normally produced by timing a lightweight
    /// GET against a configured probe URL).
    pub fn record_sample(&self, latency: Duration, throughput_mb_s: f64, error_rate: f64) {
        self.probes.fetch_add(1, Ordering::Relaxed);
        *self.sample.write() = Some(Sample {
            latency,
            throughput_mb_s,
            error_rate,
            sampled_at_elapsed: self.started.elapsed(),
        });
    }

    pub fn probes_taken(&self) -> u64 {
        self.probes.load(Ordering::Relaxed)
    }

    fn current(&self) -> Option<Sample> {
        *self.sample.read()
    }

    /// Age of the current sample; `None` if no sample has been taken yet.
    pub fn sample_age(&self) -> Option<Duration> {
        self.current()
            .map(|s| self.started.elapsed().saturating_sub(s.sampled_at_elapsed))
    }

    pub fn is_stale(&self) -> bool {
        self.sample_age().map(|age| age > STALE_AFTER).unwrap_or(true)
    }

    /// Quality bucket from the latest latency sample. `Fair` (no scaling
    /// beyond baseline) when no sample exists yet.
    pub fn quality(&self) -> Quality {
        self.current()
            .map(|s| Quality::from_latency(s.latency))
            .unwrap_or(Quality::Fair)
    }

    pub fn last_throughput_mb_s(&self) -> Option<f64> {
        self.current().map(|s| s.throughput_mb_s)
    }

    pub fn last_error_rate(&self) -> Option<f64> {
        self.current().map(|s| s.error_rate)
    }

    /// Concurrency scaled by the current quality bucket.
    pub fn optimal_concurrency(&self, base: usize) -> usize {
        ((base as f64) * self.quality().scale_factor()).round().max(1.0) as usize
    }

    /// Chunk size scaled by the current quality bucket.
    pub fn optimal_chunk_size(&self, base: usize) -> usize {
        ((base as f64) * self.quality().scale_factor()).round().max(1.0) as usize
    }

    /// Retry delay scaled inversely by the current quality bucket.
    pub fn optimal_retry_delay(&self, base: Duration) -> Duration {
        base.mul_f64(self.quality().retry_delay_scale())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_buckets_follow_latency_thresholds() {
        assert_eq!(Quality::from_latency(Duration::from_millis(10)), Quality::Excellent);
        assert_eq!(Quality::from_latency(Duration::from_millis(75)), Quality::Good);
        assert_eq!(Quality::from_latency(Duration::from_millis(200)), Quality::Fair);
        assert_eq!(Quality::from_latency(Duration::from_millis(900)), Quality::Poor);
    }

    #[test]
    fn optimal_concurrency_scales_with_quality() {
        let monitor = NetworkMonitor::new();
        monitor.record_sample(Duration::from_millis(10), 100.0, 0.0);
        assert_eq!(monitor.optimal_concurrency(10), 20);

        monitor.record_sample(Duration::from_millis(900), 5.0, 0.2);
        assert_eq!(monitor.optimal_concurrency(10), 5);
    }

    #[test]
    fn no_sample_yet_is_stale_and_fair() {
        let monitor = NetworkMonitor::new();
        assert!(monitor.is_stale());
        assert_eq!(monitor.quality(), Quality::Fair);
    }

    #[test]
    fn retry_delay_scales_inversely_with_quality() {
        let monitor = NetworkMonitor::new();
        monitor.record_sample(Duration::from_millis(900), 1.0, 0.5); // Poor
        let delay = monitor.optimal_retry_delay(Duration::from_millis(100));
        assert_eq!(delay, Duration::from_millis(200));
    }
}
