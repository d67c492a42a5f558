//! Prometheus metrics for the stream-delivery engine.
//!
//! All metrics follow the naming convention: `sd_<component>_<metric>_<unit>`
//!
//! Counters can be incremented before registration; registering only makes
//! them visible to [`encode_metrics`].

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // DELIVERY
    // =========================================================================

    /// Messages handed to the consumer
    pub static ref MESSAGES_DELIVERED: Counter = Counter::new(
        "sd_subscription_messages_delivered_total",
        "Total number of messages delivered to the consumer"
    ).expect("metric creation failed");

    /// Gaps detected in a chain
    pub static ref GAPS_DETECTED: Counter = Counter::new(
        "sd_ordering_gaps_detected_total",
        "Total number of gaps detected by the chain orderer"
    ).expect("metric creation failed");

    /// Gaps skipped because the out-of-order buffer was full
    pub static ref GAPS_SKIPPED: Counter = Counter::new(
        "sd_ordering_gaps_skipped_total",
        "Total number of gaps skipped on a full buffer"
    ).expect("metric creation failed");

    // =========================================================================
    // DECRYPTION
    // =========================================================================

    /// Decryption failures by kind
    pub static ref DECRYPTION_FAILURES: CounterVec = CounterVec::new(
        Opts::new("sd_decryption_failures_total", "Decryption failures"),
        &["kind"]  // kind: transient/permanent
    ).expect("metric creation failed");

    /// Group-key requests sent to publishers
    pub static ref GROUP_KEY_REQUESTS: Counter = Counter::new(
        "sd_key_exchange_group_key_requests_total",
        "Total group-key requests sent"
    ).expect("metric creation failed");

    /// Group-key request machines that ran out of attempts
    pub static ref GROUP_KEY_REQUESTS_EXHAUSTED: Counter = Counter::new(
        "sd_key_exchange_group_key_requests_exhausted_total",
        "Total group-key request machines that exhausted their attempts"
    ).expect("metric creation failed");

    // =========================================================================
    // SIGNATURES
    // =========================================================================

    /// Signature verifications by result
    pub static ref SIGNATURE_VERIFICATIONS: CounterVec = CounterVec::new(
        Opts::new("sd_signature_verifications_total", "Total signature verifications"),
        &["result"]  // result: valid/invalid/skipped
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(MESSAGES_DELIVERED.clone()),
        Box::new(GAPS_DETECTED.clone()),
        Box::new(GAPS_SKIPPED.clone()),
        Box::new(DECRYPTION_FAILURES.clone()),
        Box::new(GROUP_KEY_REQUESTS.clone()),
        Box::new(GROUP_KEY_REQUESTS_EXHAUSTED.clone()),
        Box::new(SIGNATURE_VERIFICATIONS.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
