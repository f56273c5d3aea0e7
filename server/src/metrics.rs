//! Prometheus metrics for the tool server.
//!
//! Session lifecycle, step outcomes and per-tool latency.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::Once;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ========== Session Metrics ==========

    /// Total sessions created
    pub static ref SESSIONS_CREATED: IntCounter = IntCounter::with_opts(
        Opts::new("arbor_sessions_created_total", "Total tree-search sessions created")
    ).unwrap();

    /// Sessions currently registered
    pub static ref SESSIONS_ACTIVE: IntGauge = IntGauge::with_opts(
        Opts::new("arbor_sessions_active", "Tree-search sessions currently registered")
    ).unwrap();

    // ========== Step Metrics ==========

    /// Committed search steps
    pub static ref STEPS_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("arbor_steps_total", "Search steps committed")
    ).unwrap();

    /// Failed steps by error kind
    pub static ref STEP_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("arbor_step_failures_total", "Search steps that failed, by error kind"),
        &["kind"]
    ).unwrap();

    /// Wall-clock time of committed steps
    pub static ref STEP_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("arbor_step_duration_seconds", "Time to run one committed search step")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0])
    ).unwrap();

    /// Expansion-function invocations made by committed steps
    pub static ref EXPANSION_INVOCATIONS: IntCounter = IntCounter::with_opts(
        Opts::new("arbor_expansion_invocations_total", "Expansion-function invocations")
    ).unwrap();

    // ========== Request Latency ==========

    /// Tool call latency by tool and outcome
    pub static ref TOOL_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("arbor_tool_duration_seconds", "Tool call latency")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        &["tool", "outcome"]
    ).unwrap();
}

static INIT: Once = Once::new();

/// Initialize and register all metrics with the registry.
/// Safe to call multiple times - only initializes once.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY.register(Box::new(SESSIONS_CREATED.clone())).unwrap();
        REGISTRY.register(Box::new(SESSIONS_ACTIVE.clone())).unwrap();
        REGISTRY.register(Box::new(STEPS_TOTAL.clone())).unwrap();
        REGISTRY.register(Box::new(STEP_FAILURES.clone())).unwrap();
        REGISTRY.register(Box::new(STEP_SECONDS.clone())).unwrap();
        REGISTRY
            .register(Box::new(EXPANSION_INVOCATIONS.clone()))
            .unwrap();
        REGISTRY.register(Box::new(TOOL_LATENCY.clone())).unwrap();
    });
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_init() {
        init_metrics();
        init_metrics();
    }

    #[test]
    fn test_encode_metrics() {
        init_metrics();
        SESSIONS_CREATED.inc();
        STEP_FAILURES.with_label_values(&["Timeout"]).inc();
        let output = encode_metrics();
        assert!(output.contains("arbor_sessions_created_total"));
        assert!(output.contains("arbor_step_failures_total{kind=\"Timeout\"}"));
    }
}
