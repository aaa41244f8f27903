//! Error types for pipeline assembly and registration.

use thiserror::Error;

/// Errors produced while configuring, assembling, or installing the pipeline.
///
/// All of these are fatal at startup: a process must not run with only part
/// of its telemetry wired.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TelemetryError {
    /// The collector endpoint is not an absolute `http://` or `https://` URI.
    #[error("invalid OTLP endpoint {url:?}: {reason}")]
    InvalidEndpoint {
        /// The rejected endpoint.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The auth header value cannot be sent as gRPC metadata.
    #[error("invalid value for the {header} header")]
    InvalidHeader {
        /// Header name; the value is never included.
        header: &'static str,
    },

    /// Failed to create the span exporter.
    #[error("failed to create trace exporter")]
    TraceExporter(#[source] opentelemetry::trace::TraceError),

    /// Failed to create the metric exporter.
    #[error("failed to create metric exporter")]
    MetricExporter(#[source] opentelemetry::metrics::MetricsError),

    /// Failed to create the log exporter.
    #[error("failed to create log exporter")]
    LogExporter(#[source] opentelemetry::logs::LogError),

    /// A pipeline has already been published to the process-wide slot.
    #[error("telemetry pipeline is already installed")]
    AlreadyInstalled,

    /// The global tracing subscriber could not be set.
    #[error("failed to initialise tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}
