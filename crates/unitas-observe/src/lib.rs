//! Observability setup for Unitas: structured logging with optional
//! OpenTelemetry span export.

pub mod tracing_setup;
