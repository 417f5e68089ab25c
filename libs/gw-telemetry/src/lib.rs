//! Tracing initialization and the in-process metrics registry (component J).
//!
//! Logging and metrics share one small facade: `init_tracing` configures
//! `tracing-subscriber` once from the environment, and `Metrics` records the
//! counters/gauges/latency samples the ingestion pipeline needs, exposed as
//! a `MetricsSnapshot` for the health/metrics HTTP surface.

mod config;
mod metrics;
mod tracing_init;

pub use config::TelemetryConfig;
pub use metrics::{Metrics, MetricsSnapshot};
pub use tracing_init::init_tracing;
