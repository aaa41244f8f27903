//! Axum request handlers for all service endpoints.

use std::any::Any;
use std::ops::RangeInclusive;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::{ErrorResponse, FibonacciQuery, FibonacciResponse, HealthResponse};
use common::ServiceError;
use opentelemetry::KeyValue;
use tracing::{error, info, warn};

use super::state::AppState;

/// Accepted values of `n`. `fib(90)` is the largest that fits in a `u64`
/// with room to spare.
pub const VALID_N: RangeInclusive<u32> = 1..=90;

/// `GET /fibonacci?n=<u32>`: the `n`-th Fibonacci number.
///
/// Every call increments `fibonacci.invocations`, tagged with
/// `fibonacci.valid.n`. An out-of-range or missing `n` is a 400 and marks the
/// request span as failed.
pub async fn fibonacci(
    State(state): State<AppState>,
    query: Result<Query<FibonacciQuery>, QueryRejection>,
) -> Response {
    let n = query.ok().map(|Query(q)| q.n).filter(|n| VALID_N.contains(n));

    state
        .fibonacci_invocations
        .add(1, &[KeyValue::new("fibonacci.valid.n", n.is_some())]);

    match n {
        Some(n) => {
            let result = fib(n);
            info!(fibonacci.n = n, fibonacci.result = result, "computed fibonacci");
            (StatusCode::OK, Json(FibonacciResponse { n, result })).into_response()
        }
        None => {
            let err = ServiceError::BadRequest(format!(
                "n must be {} <= n <= {}",
                VALID_N.start(),
                VALID_N.end()
            ));
            tracing::Span::current().record("otel.status_code", "ERROR");
            warn!(error = %err, "rejected fibonacci request");
            error_response(&err)
        }
    }
}

/// `GET /health`: liveness check, reporting which telemetry pipeline is active.
pub async fn health(State(state): State<AppState>) -> Response {
    let telemetry = if state.telemetry.is_noop() { "noop" } else { "sdk" };
    let body = HealthResponse {
        status: "ok".into(),
        telemetry: telemetry.into(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> Response {
    error_response(&ServiceError::NotFound(
        "the requested resource does not exist".into(),
    ))
}

/// Turns a handler panic into a JSON 500. The panic payload is logged, never
/// returned.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload");
    error!(panic = detail, "handler panicked");
    error_response(&ServiceError::Internal("internal server error".into()))
}

fn error_response(err: &ServiceError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse::from(err))).into_response()
}

/// Iterative Fibonacci with `fib(1) == fib(2) == 1`.
fn fib(n: u32) -> u64 {
    let (mut a, mut b) = (0_u64, 1_u64);
    for _ in 0..n {
        (a, b) = (b, a + b);
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fib_small_values() {
        let expected = [1, 1, 2, 3, 5, 8, 13, 21, 34, 55];
        for (i, want) in expected.iter().enumerate() {
            assert_eq!(fib(i as u32 + 1), *want, "fib({})", i + 1);
        }
    }

    #[test]
    fn fib_upper_bound_fits() {
        assert_eq!(fib(90), 2_880_067_194_370_816_120);
    }

    #[test]
    fn error_response_uses_service_status() {
        let resp = error_response(&ServiceError::BadRequest("nope".into()));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = error_response(&ServiceError::NotFound("gone".into()));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn panic_becomes_internal_error() {
        let resp = panic_response(Box::new("boom"));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let resp = panic_response(Box::new(String::from("boom")));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let resp = panic_response(Box::new(42_u8));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
