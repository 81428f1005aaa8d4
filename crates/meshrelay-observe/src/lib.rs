//! Observability bootstrap for meshrelay: tracing subscriber setup with an
//! optional OpenTelemetry stdout exporter.

pub mod tracing_setup;

pub use tracing_setup::{LogFormat, TracingOptions, init_tracing, shutdown_tracing};
