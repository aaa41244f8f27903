//! Request and response types exchanged over the public HTTP API.

use serde::{Deserialize, Serialize};

use crate::ServiceError;

// ---------------------------------------------------------------------------
// Fibonacci endpoint
// ---------------------------------------------------------------------------

/// Query string for `GET /fibonacci`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FibonacciQuery {
    /// Position in the sequence to compute. Must be within `1..=90`.
    pub n: u32,
}

/// Successful response body for `GET /fibonacci`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FibonacciResponse {
    /// Echo of the requested position.
    pub n: u32,
    /// The `n`-th Fibonacci number.
    pub result: u64,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&ServiceError> for ErrorResponse {
    fn from(err: &ServiceError) -> Self {
        Self::new(err.code(), err.message())
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status. Always `"ok"` while the process serves requests.
    pub status: String,
    /// Which telemetry pipeline is active: `"sdk"` or `"noop"`.
    pub telemetry: String,
}
