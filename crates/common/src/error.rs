//! Common error types shared across crates.

use thiserror::Error;

/// Top-level service error type.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::BadRequest`] → 400
/// - [`ServiceError::NotFound`] → 404
/// - [`ServiceError::Internal`] → 500
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was malformed: missing or out-of-range query parameter.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// No route matches the request path.
    #[error("not found: {0}")]
    NotFound(String),

    /// A handler panicked.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::NotFound(_) => 404,
            ServiceError::Internal(_) => 500,
        }
    }

    /// Short machine-readable code used in [`ErrorResponse`](crate::protocol::ErrorResponse).
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Internal(_) => "internal_error",
        }
    }

    /// The message without the variant prefix, safe to expose to callers.
    pub fn message(&self) -> &str {
        match self {
            ServiceError::BadRequest(m) | ServiceError::NotFound(m) | ServiceError::Internal(m) => m,
        }
    }
}
