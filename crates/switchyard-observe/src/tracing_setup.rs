//! Tracing subscriber initialization with structured logging and optional
//! OpenTelemetry trace export.
//!
//! # Usage
//!
//! ```no_run
//! // Structured logging only
//! switchyard_observe::tracing_setup::init_tracing(false).unwrap();
//!
//! // With OpenTelemetry export to stdout (for local development)
//! switchyard_observe::tracing_setup::init_tracing(true).unwrap();
//! ```

use std::sync::OnceLock;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Level used when `RUST_LOG` is unset.
pub const DEFAULT_LEVEL: &str = "warn";

/// Kept so the provider can be flushed on exit.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Initialize the global tracing subscriber at [`DEFAULT_LEVEL`].
///
/// See [`init_tracing_with_level`].
pub fn init_tracing(enable_otel: bool) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing_with_level(enable_otel, DEFAULT_LEVEL)
}

/// Initialize the global tracing subscriber.
///
/// - Always installs a `fmt` layer on stderr with targets and span close
///   timing, so stdout stays free for command output.
/// - When `enable_otel` is true, additionally bridges spans to OpenTelemetry
///   through the stdout exporter.
/// - `RUST_LOG` wins over `default_level` when set.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed or if
/// `default_level` is not a valid filter directive.
pub fn init_tracing_with_level(
    enable_otel: bool,
    default_level: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = build_filter(std::env::var("RUST_LOG").ok().as_deref(), default_level)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    if enable_otel {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("switchyard");
        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}

/// Build the filter from an explicit `RUST_LOG` value, falling back to
/// `default_level` when it is absent or blank.
fn build_filter(
    rust_log: Option<&str>,
    default_level: &str,
) -> Result<EnvFilter, tracing_subscriber::filter::ParseError> {
    match rust_log.map(str::trim).filter(|s| !s.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives),
        None => EnvFilter::try_new(default_level),
    }
}

/// Flush pending traces and shut down the OpenTelemetry tracer provider.
///
/// No-op when OTel was not enabled.
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            eprintln!("Warning: OTel tracer provider shutdown error: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_uses_default_when_rust_log_is_unset_or_blank() {
        let filter = build_filter(None, "info").unwrap();
        assert_eq!(filter.to_string(), "info");

        let filter = build_filter(Some("  "), "debug").unwrap();
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn rust_log_overrides_default() {
        let filter = build_filter(Some("switchyard_core=trace"), "warn").unwrap();
        assert_eq!(filter.to_string(), "switchyard_core=trace");
    }

    #[test]
    fn invalid_default_is_an_error() {
        assert!(build_filter(None, "switchyard=loud").is_err());
    }

    #[test]
    fn shutdown_without_otel_is_noop() {
        shutdown_tracing();
    }
}
