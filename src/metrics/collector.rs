// src/metrics/collector.rs
use crate::load_balancer::BackendStatus;
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // Inbound
    pub requests_total: IntCounterVec,
    pub request_duration_seconds: HistogramVec,
    pub exhausted_total: IntCounter,

    // Backend attempts
    pub backend_attempts_total: IntCounterVec,
    pub backend_attempt_duration_seconds: HistogramVec,
    pub backend_quarantines_total: IntCounterVec,
    pub backend_quarantined: IntGaugeVec,

    pub total_backends: IntGauge,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("lb_requests_total", "Total number of requests"),
            &["status_code"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "lb_request_duration_seconds",
                "Request duration in seconds, retries included",
            ),
            &["status_code"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        let exhausted_total = IntCounter::new(
            "lb_all_backends_unavailable_total",
            "Dispatches that ran out of attempts",
        )?;
        registry.register(Box::new(exhausted_total.clone()))?;

        let backend_attempts_total = IntCounterVec::new(
            Opts::new("lb_backend_attempts_total", "Backend attempts by outcome"),
            &["backend", "outcome"],
        )?;
        registry.register(Box::new(backend_attempts_total.clone()))?;

        let backend_attempt_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "lb_backend_attempt_duration_seconds",
                "Backend attempt duration",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_attempt_duration_seconds.clone()))?;

        let backend_quarantines_total = IntCounterVec::new(
            Opts::new(
                "lb_backend_quarantines_total",
                "Times a backend was put in quarantine",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_quarantines_total.clone()))?;

        let backend_quarantined = IntGaugeVec::new(
            Opts::new(
                "lb_backend_quarantined",
                "Backend quarantine status (1=quarantined, 0=eligible)",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_quarantined.clone()))?;

        let total_backends = IntGauge::new("lb_total_backends", "Total number of backends")?;
        registry.register(Box::new(total_backends.clone()))?;

        Ok(Self {
            requests_total,
            request_duration_seconds,
            exhausted_total,
            backend_attempts_total,
            backend_attempt_duration_seconds,
            backend_quarantines_total,
            backend_quarantined,
            total_backends,
        })
    }

    pub fn record_request(&self, status_code: u16, duration: std::time::Duration) {
        let status = status_code.to_string();
        self.requests_total.with_label_values(&[&status]).inc();
        self.request_duration_seconds
            .with_label_values(&[&status])
            .observe(duration.as_secs_f64());
    }

    pub fn record_attempt(&self, backend: &str, outcome: &str, duration: std::time::Duration) {
        self.backend_attempts_total
            .with_label_values(&[backend, outcome])
            .inc();
        self.backend_attempt_duration_seconds
            .with_label_values(&[backend])
            .observe(duration.as_secs_f64());
    }

    pub fn record_quarantine(&self, backend: &str) {
        self.backend_quarantines_total
            .with_label_values(&[backend])
            .inc();
        self.backend_quarantined.with_label_values(&[backend]).set(1);
    }

    pub fn record_exhausted(&self) {
        self.exhausted_total.inc();
    }

    /// Refreshes the quarantine gauges, e.g. right before a scrape.
    pub fn update_backends(&self, statuses: &[BackendStatus]) {
        self.total_backends.set(statuses.len() as i64);
        for status in statuses {
            self.backend_quarantined
                .with_label_values(&[&status.address])
                .set(i64::from(status.quarantined));
        }
    }
}

// Helper for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
