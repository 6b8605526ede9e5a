//! Herald Telemetry - tracing subscriber and Prometheus metrics.

pub mod metrics;
pub mod tracer;

pub use metrics::{metrics_handler, with_metrics, HeraldMetrics, METRICS};
pub use tracer::{init_tracing, TelemetryConfig};
