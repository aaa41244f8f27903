//! Pipeline configuration: one validated struct, one exporter config per signal.

use std::fmt;
use std::time::Duration;

use axum::http::Uri;

use crate::env::{Resolver, ValueSource};
use crate::error::TelemetryError;

/// Environment/property key holding the New Relic license key.
pub const LICENSE_KEY_VAR: &str = "newrelicLicenseKey";

/// Environment/property key holding the OTLP collector endpoint.
pub const ENDPOINT_VAR: &str = "newrelicOtlpEndpoint";

/// Collector used when no endpoint is configured.
pub const DEFAULT_ENDPOINT: &str = "https://otlp.nr-data.net:4317";

/// `service.name` attached to every exported resource.
pub const SERVICE_NAME: &str = "getting-started-java";

/// gRPC metadata key carrying the license key.
pub const AUTH_HEADER: &str = "api-key";

/// New Relic rejects attribute values longer than this many characters.
pub const MAX_ATTRIBUTE_VALUE_LENGTH: usize = 4095;

/// OTLP exporter default; not overridden here.
pub const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// The three exported signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Traces,
    Metrics,
    Logs,
}

impl Signal {
    pub const ALL: [Signal; 3] = [Signal::Traces, Signal::Metrics, Signal::Logs];
}

/// Payload compression applied by the exporters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
}

impl From<Compression> for opentelemetry_otlp::Compression {
    fn from(value: Compression) -> Self {
        match value {
            Compression::Gzip => opentelemetry_otlp::Compression::Gzip,
        }
    }
}

/// A header value that must never show up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

/// Destination, auth and encoding for one signal's exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterConfig {
    pub signal: Signal,
    pub endpoint: String,
    pub compression: Compression,
    pub auth_header: (&'static str, Secret),
    pub timeout: Duration,
}

impl ExporterConfig {
    /// Value of header `name`, if this exporter sends it.
    pub fn header(&self, name: &str) -> Option<&str> {
        (self.auth_header.0 == name).then(|| self.auth_header.1.expose())
    }

    /// Whether the channel must negotiate TLS.
    pub fn uses_tls(&self) -> bool {
        self.endpoint.starts_with("https://")
    }
}

/// Validated settings for the whole telemetry pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    service_name: String,
    endpoint: String,
    license_key: Secret,
    max_attribute_value_length: usize,
}

impl PipelineConfig {
    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::InvalidEndpoint`] unless `endpoint` is an absolute
    /// `http`/`https` URI with a host; [`TelemetryError::InvalidHeader`] if the
    /// license key is not visible ASCII.
    pub fn new(
        service_name: impl Into<String>,
        endpoint: impl Into<String>,
        license_key: impl Into<String>,
    ) -> Result<Self, TelemetryError> {
        let endpoint = endpoint.into();
        validate_endpoint(&endpoint)?;

        let license_key = license_key.into();
        if !license_key.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
            return Err(TelemetryError::InvalidHeader {
                header: AUTH_HEADER,
            });
        }

        Ok(Self {
            service_name: service_name.into(),
            endpoint,
            license_key: Secret(license_key),
            max_attribute_value_length: MAX_ATTRIBUTE_VALUE_LENGTH,
        })
    }

    /// Resolve the license key and endpoint, then validate.
    ///
    /// Unset or blank keys fall back to an empty license key and
    /// [`DEFAULT_ENDPOINT`], so an unconfigured process still starts.
    pub fn from_resolver<E: ValueSource, P: ValueSource>(
        resolver: &Resolver<E, P>,
    ) -> Result<Self, TelemetryError> {
        let license_key = resolver.string(LICENSE_KEY_VAR, "");
        let endpoint = resolver.string(ENDPOINT_VAR, DEFAULT_ENDPOINT);
        Self::new(SERVICE_NAME, endpoint, license_key)
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn max_attribute_value_length(&self) -> usize {
        self.max_attribute_value_length
    }

    /// Exporter settings for `signal`. All signals share endpoint and auth.
    pub fn exporter(&self, signal: Signal) -> ExporterConfig {
        ExporterConfig {
            signal,
            endpoint: self.endpoint.clone(),
            compression: Compression::Gzip,
            auth_header: (AUTH_HEADER, self.license_key.clone()),
            timeout: DEFAULT_EXPORT_TIMEOUT,
        }
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), TelemetryError> {
    let invalid = |reason: &str| TelemetryError::InvalidEndpoint {
        url: endpoint.to_owned(),
        reason: reason.to_owned(),
    };

    let uri: Uri = endpoint.parse().map_err(|_| invalid("not a valid URI"))?;
    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        Some(_) => return Err(invalid("scheme must be http or https")),
        None => return Err(invalid("missing scheme")),
    }
    if uri.host().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(())
}
