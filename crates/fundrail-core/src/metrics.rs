//! Injected metrics seam.
//!
//! Balance gauges and submission counters go through a caller-supplied
//! sink instead of process-global registries, so concurrent test runs
//! never cross-pollute state.

/// Receives operational measurements from background loops and clients.
pub trait MetricsSink: Send + Sync {
    fn gauge(&self, name: &str, labels: &[(&str, &str)], value: f64);
    fn counter(&self, name: &str, labels: &[(&str, &str)], increment: u64);
}

/// Discards every measurement. The default for callers that do not wire
/// up an observability backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn gauge(&self, _name: &str, _labels: &[(&str, &str)], _value: f64) {}

    fn counter(&self, _name: &str, _labels: &[(&str, &str)], _increment: u64) {}
}
