//! Observability for the control API
//!
//! Logging goes through `tracing`; this module holds the request counters
//! and the Prometheus rendering behind `GET /metrics`.

mod metrics;
mod prometheus;

pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use prometheus::render_metrics;
