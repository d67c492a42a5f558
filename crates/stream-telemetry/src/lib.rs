//! # Stream Telemetry
//!
//! Logging and metrics for the stream-delivery engine.
//!
//! ## Components
//!
//! - **Logs**: `tracing` events with structured fields, rendered by a
//!   `tracing-subscriber` fmt or JSON layer
//! - **Metrics**: Prometheus counters in a crate-local registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stream_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     init_telemetry(&TelemetryConfig::from_env()).expect("Failed to init telemetry");
//!     // Subscriptions now log and count
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SD_SERVICE_NAME` | `stream-delivery` | Service name in log lines |
//! | `SD_LOG_LEVEL` | `info` | Log level filter (`RUST_LOG` also honoured) |
//! | `SD_CONSOLE_OUTPUT` | `true` | Write events to stdout |
//! | `SD_JSON_LOGS` | `false` | Emit JSON instead of human-readable lines |

#![warn(missing_docs)]

mod config;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    encode_metrics, register_metrics, DECRYPTION_FAILURES, GAPS_DETECTED, GAPS_SKIPPED,
    GROUP_KEY_REQUESTS, GROUP_KEY_REQUESTS_EXHAUSTED, MESSAGES_DELIVERED,
    SIGNATURE_VERIFICATIONS,
};
pub use tracing_setup::init_tracing;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The global subscriber could not be installed.
    #[error("Failed to initialize tracing: {0}")]
    TracingInit(String),

    /// Metric registration or encoding failed.
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    /// The configuration could not be applied.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// Call once per process. Metrics are registered first so that a tracing
/// failure still leaves counters exportable.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    register_metrics()?;
    init_tracing(config)
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
