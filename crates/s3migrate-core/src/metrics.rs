//! Prometheus Metrics for the migration execution engine.
//!
//! One `Registry`, one struct field per metric family, a constructor
//! that registers everything up front, and small `record_*` helpers so
//! call sites never touch label strings directly.
//!
//! # Usage
//!
//! ```rust,ignore
//! use s3migrate_core::metrics::EngineMetrics;
//!
//! let metrics = EngineMetrics::new()?;
//! metrics.record_copy("succeeded", 1_048_576, 0.8);
//! ```

#[cfg(feature = "metrics")]
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Copy-operation duration buckets (in seconds); wide enough to cover a
/// simple server-side copy and a multi-gigabyte multipart transfer.
#[cfg(feature = "metrics")]
const COPY_LATENCY_BUCKETS: &[f64] = &[
    0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 180.0, 600.0,
];

/// Prometheus metrics for one running migration engine instance.
#[cfg(feature = "metrics")]
#[derive(Clone)]
pub struct EngineMetrics {
    pub registry: Registry,

    // ============ Copy Metrics ============
    /// Objects copied, by outcome (succeeded, failed, cancelled).
    pub objects_total: IntCounterVec,

    /// Bytes copied, by outcome.
    pub bytes_total: IntCounterVec,

    /// Copy operation duration in seconds, by strategy (simple, multipart,
    /// streaming, empty).
    pub copy_duration_seconds: HistogramVec,

    /// Currently active worker goroutines.
    pub active_workers: IntGauge,

    // ============ Integrity Metrics ============
    /// Integrity results, by validity (valid, invalid).
    pub integrity_results_total: IntCounterVec,

    // ============ Listing Metrics ============
    /// Pages fetched during source/destination listing.
    pub list_pages_total: IntCounterVec,

    /// Pagination loop or page-cap warnings observed.
    pub list_warnings_total: IntCounterVec,

    // ============ Client Pool Metrics ============
    /// Provider errors recorded by a client pool, by operation.
    pub provider_errors_total: IntCounterVec,
}

#[cfg(feature = "metrics")]
impl EngineMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let objects_total = IntCounterVec::new(
            Opts::new("objects_total", "Objects processed by outcome").namespace("s3migrate"),
            &["outcome"],
        )?;

        let bytes_total = IntCounterVec::new(
            Opts::new("bytes_total", "Bytes processed by outcome").namespace("s3migrate"),
            &["outcome"],
        )?;

        let copy_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "copy_duration_seconds",
                "Per-object copy duration in seconds",
            )
            .namespace("s3migrate")
            .buckets(COPY_LATENCY_BUCKETS.to_vec()),
            &["strategy"],
        )?;

        let active_workers = IntGauge::new(
            "s3migrate_active_workers",
            "Currently active copy worker tasks",
        )?;

        let integrity_results_total = IntCounterVec::new(
            Opts::new("integrity_results_total", "Integrity results by validity")
                .namespace("s3migrate"),
            &["valid"],
        )?;

        let list_pages_total = IntCounterVec::new(
            Opts::new("list_pages_total", "Listing pages fetched").namespace("s3migrate"),
            &["target"],
        )?;

        let list_warnings_total = IntCounterVec::new(
            Opts::new("list_warnings_total", "Listing anomaly warnings").namespace("s3migrate"),
            &["kind"],
        )?;

        let provider_errors_total = IntCounterVec::new(
            Opts::new("provider_errors_total", "Provider call errors by operation")
                .namespace("s3migrate"),
            &["operation"],
        )?;

        registry.register(Box::new(objects_total.clone()))?;
        registry.register(Box::new(bytes_total.clone()))?;
        registry.register(Box::new(copy_duration_seconds.clone()))?;
        registry.register(Box::new(active_workers.clone()))?;
        registry.register(Box::new(integrity_results_total.clone()))?;
        registry.register(Box::new(list_pages_total.clone()))?;
        registry.register(Box::new(list_warnings_total.clone()))?;
        registry.register(Box::new(provider_errors_total.clone()))?;

        Ok(Self {
            registry,
            objects_total,
            bytes_total,
            copy_duration_seconds,
            active_workers,
            integrity_results_total,
            list_pages_total,
            list_warnings_total,
            provider_errors_total,
        })
    }

    /// Encode all metrics as Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder.encode_to_string(&families)
    }

    /// Record one completed copy job outcome.
    pub fn record_copy(&self, outcome: &str, strategy: &str, bytes: u64, duration_secs: f64) {
        self.objects_total.with_label_values(&[outcome]).inc();
        self.bytes_total
            .with_label_values(&[outcome])
            .inc_by(bytes);
        self.copy_duration_seconds
            .with_label_values(&[strategy])
            .observe(duration_secs);
    }

    pub fn record_integrity_result(&self, is_valid: bool) {
        let label = if is_valid { "valid" } else { "invalid" };
        self.integrity_results_total
            .with_label_values(&[label])
            .inc();
    }

    pub fn record_list_page(&self, target: &str) {
        self.list_pages_total.with_label_values(&[target]).inc();
    }

    pub fn record_list_warning(&self, kind: &str) {
        self.list_warnings_total.with_label_values(&[kind]).inc();
    }

    pub fn record_provider_error(&self, operation: &str) {
        self.provider_errors_total
            .with_label_values(&[operation])
            .inc();
    }

    pub fn set_active_workers(&self, count: i64) {
        self.active_workers.set(count);
    }
}

/// Timer guard for automatic duration recording; call [`stop`](Self::stop)
/// with the observed value, or drop it unused when a call is abandoned.
#[cfg(feature = "metrics")]
pub struct MetricTimer {
    start: std::time::Instant,
    histogram: Histogram,
}

#[cfg(feature = "metrics")]
impl MetricTimer {
    pub fn new(histogram: Histogram) -> Self {
        Self {
            start: std::time::Instant::now(),
            histogram,
        }
    }

    pub fn stop(self) -> f64 {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
        duration
    }
}

#[cfg(test)]
#[cfg(feature = "metrics")]
mod tests {
    use super::*;

    #[test]
    fn records_copy_outcomes_and_encodes() {
        let metrics = EngineMetrics::new().expect("metrics registry builds");
        metrics.record_copy("succeeded", "simple", 1024, 0.05);
        metrics.record_copy("failed", "streaming", 0, 1.2);
        metrics.record_integrity_result(true);
        metrics.record_integrity_result(false);
        metrics.record_list_page("source");
        metrics.record_list_warning("pagination_loop");
        metrics.record_provider_error("get_object");
        metrics.set_active_workers(4);

        let output = metrics.encode().expect("encodes to text format");
        assert!(output.contains("s3migrate_objects_total"));
        assert!(output.contains("outcome=\"succeeded\""));
        assert!(output.contains("s3migrate_integrity_results_total"));
        assert!(output.contains("s3migrate_active_workers 4"));
    }

    #[test]
    fn metric_timer_records_observed_duration() {
        let metrics = EngineMetrics::new().unwrap();
        let timer = MetricTimer::new(
            metrics
                .copy_duration_seconds
                .with_label_values(&["simple"]),
        );
        std::thread::sleep(std::time::Duration::from_millis(1));
        let elapsed = timer.stop();
        assert!(elapsed > 0.0);
    }
}
