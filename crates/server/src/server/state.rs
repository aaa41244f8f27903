//! Shared application state injected into every Axum handler.

use opentelemetry::metrics::Counter;
use telemetry::Telemetry;

/// Meter scope for application instruments.
const METER_NAME: &str = "getting-started";

/// Application state shared across all request handlers.
///
/// All fields are cheaply cloneable (`Arc`-backed) so that Axum can clone the
/// state for each request without copying expensive data.
#[derive(Clone)]
pub struct AppState {
    /// The telemetry pipeline, or a no-op handle.
    pub telemetry: Telemetry,
    /// Counts `/fibonacci` calls, tagged with whether `n` was in range.
    pub fibonacci_invocations: Counter<u64>,
}

impl AppState {
    /// Create a new [`AppState`] whose instruments come from `telemetry`.
    pub fn new(telemetry: Telemetry) -> Self {
        let fibonacci_invocations = telemetry
            .meter(METER_NAME)
            .u64_counter("fibonacci.invocations")
            .with_description("Calls to GET /fibonacci")
            .init();
        Self {
            telemetry,
            fibonacci_invocations,
        }
    }
}

impl Default for AppState {
    /// Creates an [`AppState`] backed by no-op telemetry, suitable for tests.
    fn default() -> Self {
        Self::new(Telemetry::noop())
    }
}
