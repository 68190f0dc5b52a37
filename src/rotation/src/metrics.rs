//! Rotation metrics
//!
//! The orchestrator reports through [`MetricsSink`]; recording is
//! best-effort and never fails a rotation.

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

const METRICS_NAMESPACE: &str = "keywarden";

/// Receiver of rotation observations
pub trait MetricsSink: Send + Sync {
    /// Wall-clock time spent generating one key
    fn observe_key_generation(&self, algorithm: &str, elapsed: Duration);

    /// A rotation completed (published and persisted)
    fn record_rotation(&self, algorithm: &str, namespace: &str);

    /// A rotation failed at the stage named by `reason`
    fn record_rotation_error(&self, reason: &str, namespace: &str);
}

/// Discards every observation
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn observe_key_generation(&self, _algorithm: &str, _elapsed: Duration) {}
    fn record_rotation(&self, _algorithm: &str, _namespace: &str) {}
    fn record_rotation_error(&self, _reason: &str, _namespace: &str) {}
}

/// Prometheus metrics on a registry owned by this instance
pub struct PrometheusMetrics {
    /// Total successful rotations
    pub rotations_total: IntCounterVec,

    /// Total failed rotations by stage
    pub rotation_errors_total: IntCounterVec,

    /// Key generation latency in seconds
    pub key_generation_duration: HistogramVec,

    registry: Registry,
}

impl PrometheusMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let rotations_total = IntCounterVec::new(
            Opts::new("rotations_total", "Total number of successful key rotations")
                .namespace(METRICS_NAMESPACE),
            &["algorithm", "namespace"],
        )?;
        registry.register(Box::new(rotations_total.clone()))?;

        let rotation_errors_total = IntCounterVec::new(
            Opts::new("rotation_errors_total", "Total number of failed key rotations")
                .namespace(METRICS_NAMESPACE),
            &["reason", "namespace"],
        )?;
        registry.register(Box::new(rotation_errors_total.clone()))?;

        let key_generation_duration = HistogramVec::new(
            HistogramOpts::new(
                "key_generation_duration_seconds",
                "Time taken to generate a key pair",
            )
            .namespace(METRICS_NAMESPACE),
            &["algorithm"],
        )?;
        registry.register(Box::new(key_generation_duration.clone()))?;

        Ok(Self {
            rotations_total,
            rotation_errors_total,
            key_generation_duration,
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition format of every metric in the registry
    pub fn export(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl MetricsSink for PrometheusMetrics {
    fn observe_key_generation(&self, algorithm: &str, elapsed: Duration) {
        match self.key_generation_duration.get_metric_with_label_values(&[algorithm]) {
            Ok(histogram) => histogram.observe(elapsed.as_secs_f64()),
            Err(e) => tracing::debug!(error = %e, "dropping key generation observation"),
        }
    }

    fn record_rotation(&self, algorithm: &str, namespace: &str) {
        match self.rotations_total.get_metric_with_label_values(&[algorithm, namespace]) {
            Ok(counter) => counter.inc(),
            Err(e) => tracing::debug!(error = %e, "dropping rotation count"),
        }
    }

    fn record_rotation_error(&self, reason: &str, namespace: &str) {
        match self.rotation_errors_total.get_metric_with_label_values(&[reason, namespace]) {
            Ok(counter) => counter.inc(),
            Err(e) => tracing::debug!(error = %e, "dropping rotation error count"),
        }
    }
}
