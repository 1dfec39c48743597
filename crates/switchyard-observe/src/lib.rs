//! Observability for Switchyard.
//!
//! [`tracing_setup`] installs the global subscriber (structured logs plus an
//! optional OpenTelemetry bridge). [`genai_attrs`] names the span fields that
//! follow the OTel GenAI semantic conventions.

pub mod genai_attrs;
pub mod tracing_setup;
