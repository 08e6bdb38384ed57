//! Prometheus metrics for meshfault.
//!
//! Tracks fault lifecycle transitions and injection activity.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

lazy_static! {
    /// Fault lifecycle transitions
    pub static ref FAULT_TRANSITIONS_TOTAL: CounterVec = register_counter_vec!(
        "meshfault_fault_transitions_total",
        "Total number of fault lifecycle transitions",
        &["fault", "transition"]  // transition: start|stop|rejected
    )
    .unwrap();

    /// Faults currently running
    pub static ref FAULTS_RUNNING: Gauge = register_gauge!(
        "meshfault_faults_running",
        "Number of faults currently running"
    )
    .unwrap();

    /// Total number of injections fired
    pub static ref INJECTIONS_TOTAL: CounterVec = register_counter_vec!(
        "meshfault_injections_total",
        "Total number of injections fired by the middleware",
        &["type", "rule_id"]
    )
    .unwrap();

    /// Latency injection duration in milliseconds
    pub static ref LATENCY_INJECTED_MS: HistogramVec = register_histogram_vec!(
        "meshfault_latency_injected_ms",
        "Histogram of injected latency in milliseconds",
        &["rule_id"],
        vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap();

    /// Metric values replaced by an anomaly
    pub static ref METRIC_ANOMALIES_TOTAL: CounterVec = register_counter_vec!(
        "meshfault_metric_anomalies_total",
        "Total number of metric values perturbed",
        &["metric", "rule_id"]
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_transition(fault: &str, transition: &str) {
    FAULT_TRANSITIONS_TOTAL
        .with_label_values(&[fault, transition])
        .inc();
    match transition {
        "start" => FAULTS_RUNNING.inc(),
        "stop" => FAULTS_RUNNING.dec(),
        _ => {}
    }
}

pub fn record_injection(injection_type: &str, rule_id: &str) {
    INJECTIONS_TOTAL
        .with_label_values(&[injection_type, rule_id])
        .inc();
}

pub fn record_latency(rule_id: &str, duration_ms: u64) {
    LATENCY_INJECTED_MS
        .with_label_values(&[rule_id])
        .observe(duration_ms as f64);
}

pub fn record_metric_anomaly(metric: &str, rule_id: &str) {
    METRIC_ANOMALIES_TOTAL
        .with_label_values(&[metric, rule_id])
        .inc();
}
