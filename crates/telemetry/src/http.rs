//! Request spans for the axum server.
//!
//! [`trace_layer`] configures `tower-http`'s [`TraceLayer`] so every inbound
//! request gets one `http.request` server span, parented on the caller's W3C
//! `traceparent` when present. The span closes once the response body is done
//! or the request fails, whatever the handler did.

use std::time::Duration;

use axum::extract::MatchedPath;
use axum::http::{HeaderMap, Request, Response};
use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry::Context;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::trace::{
    DefaultOnBodyChunk, DefaultOnEos, DefaultOnRequest, HttpMakeClassifier, MakeSpan, OnFailure,
    OnResponse, TraceLayer,
};
use tracing::field::Empty;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::pipeline::Telemetry;

/// The fully configured request-span layer.
pub type RequestTraceLayer = TraceLayer<
    HttpMakeClassifier,
    MakeRequestSpan,
    DefaultOnRequest,
    RecordResponse,
    DefaultOnBodyChunk,
    DefaultOnEos,
    RecordFailure,
>;

/// Build the request-span layer for `telemetry`.
///
/// Context is extracted with the pipeline's propagator. A no-op handle still
/// extracts W3C context so log lines carry the caller's trace id.
pub fn trace_layer(telemetry: &Telemetry) -> RequestTraceLayer {
    let propagator = telemetry
        .pipeline()
        .map(|p| p.propagator().clone())
        .unwrap_or_default();

    TraceLayer::new_for_http()
        .make_span_with(MakeRequestSpan { propagator })
        .on_response(RecordResponse)
        .on_failure(RecordFailure)
}

/// Inbound trace context carried by `headers`, or an empty context.
pub fn extract_context(propagator: &impl TextMapPropagator, headers: &HeaderMap) -> Context {
    propagator.extract(&HeaderExtractor(headers))
}

/// Opens the server span and attaches the inbound trace context.
#[derive(Debug, Clone, Default)]
pub struct MakeRequestSpan {
    propagator: TraceContextPropagator,
}

impl<B> MakeSpan<B> for MakeRequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let method = request.method().as_str();
        let route = request
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str);
        let name = match route {
            Some(route) => format!("{method} {route}"),
            None => method.to_owned(),
        };

        let span = tracing::info_span!(
            "http.request",
            otel.name = %name,
            otel.kind = "server",
            http.request.method = %method,
            http.route = route,
            url.path = %request.uri().path(),
            http.response.status_code = Empty,
            otel.status_code = Empty,
        );
        span.set_parent(extract_context(&self.propagator, request.headers()));
        span
    }
}

/// Records the response status on the request span.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordResponse;

impl<B> OnResponse<B> for RecordResponse {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        span.record("http.response.status_code", response.status().as_u16());
        tracing::debug!(
            parent: span,
            status = response.status().as_u16(),
            latency_ms = latency.as_millis() as u64,
            "request finished"
        );
    }
}

/// Marks the request span as failed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordFailure;

impl OnFailure<ServerErrorsFailureClass> for RecordFailure {
    fn on_failure(&mut self, failure: ServerErrorsFailureClass, latency: Duration, span: &Span) {
        span.record("otel.status_code", "ERROR");
        tracing::warn!(
            parent: span,
            classification = %failure,
            latency_ms = latency.as_millis() as u64,
            "request failed"
        );
    }
}

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}
