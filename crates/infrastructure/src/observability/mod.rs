//! Observability module
//!
//! Structured logging for run lifecycle and rotation events, Prometheus
//! metrics, and subscriber setup.

pub mod metrics_collector;
pub mod structured_logger;
pub mod telemetry_setup;

pub use metrics_collector::MetricsCollector;
pub use structured_logger::{LogFormat, LoggingConfig, StructuredLogger};
pub use telemetry_setup::{init_metrics, init_observability, init_structured_logging};
