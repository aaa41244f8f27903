//! Axum router construction.

use axum::{routing::get, Router};
use tower_http::{
    catch_panic::CatchPanicLayer, compression::CompressionLayer, timeout::TimeoutLayer,
};

use super::{handlers, middleware, state::AppState};

/// Build the application [`Router`] with all routes and middleware attached.
///
/// The request-span layer sits outside panic recovery and the timeout, so a
/// panicking or timed-out handler still ends its span with the 5xx status.
pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/fibonacci", get(handlers::fibonacci))
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(CatchPanicLayer::custom(handlers::panic_response))
        .layer(TimeoutLayer::new(middleware::REQUEST_TIMEOUT))
        .layer(telemetry::http::trace_layer(&state.telemetry))
        .layer(CompressionLayer::new())
        .with_state(state)
}
