//! The process-wide `tracing` subscriber: JSON logs to stdout, spans to the
//! trace pipeline, and events to the log pipeline.

use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::TelemetryError;
use crate::pipeline::Telemetry;

/// Tracer scope for spans created through `tracing`.
const TRACER_NAME: &str = "getting-started";

/// Crates on the export path. Their spans and events never reach the
/// pipelines, or every export would produce more telemetry to export.
const EXPORT_PATH_DIRECTIVES: &str = "h2=off,hyper=off,tonic=off,tower=off,opentelemetry=off";

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `log_level` for the stdout layer. The span layer and
/// the log bridge both filter at `log_level` with the export path switched
/// off. With a no-op `telemetry` only the stdout layer is installed.
///
/// # Errors
///
/// [`TelemetryError::Subscriber`] if a global subscriber is already set.
pub fn init(telemetry: &Telemetry, log_level: &str) -> Result<(), TelemetryError> {
    let (otel_layer, bridge_layer) = match telemetry.pipeline() {
        Some(pipeline) => (
            Some(
                tracing_opentelemetry::layer()
                    .with_tracer(pipeline.tracer(TRACER_NAME))
                    .with_filter(export_filter(log_level)),
            ),
            Some(
                OpenTelemetryTracingBridge::new(pipeline.logger_provider())
                    .with_filter(export_filter(log_level)),
            ),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().json().with_filter(stdout_filter(log_level)))
        .with(otel_layer)
        .with(bridge_layer)
        .try_init()?;

    tracing::debug!(noop = telemetry.is_noop(), "tracing subscriber installed");
    Ok(())
}

fn stdout_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

fn export_filter(log_level: &str) -> EnvFilter {
    EnvFilter::new(format!("{log_level},{EXPORT_PATH_DIRECTIVES}"))
}
