//! Logging middleware
//!
//! Request spans for the HTTP layer.

use axum::{body::Body, http::Request};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{info_span, Level, Span};
use uuid::Uuid;

/// Span per request carrying method, path and a request id
pub fn make_request_span(request: &Request<Body>) -> Span {
    info_span!(
        "request",
        request_id = %Uuid::new_v4(),
        method = %request.method(),
        path = %request.uri().path(),
    )
}

type MakeSpan = fn(&Request<Body>) -> Span;

pub fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, MakeSpan, DefaultOnRequest, DefaultOnResponse> {
    TraceLayer::new_for_http()
        .make_span_with(make_request_span as MakeSpan)
        .on_response(DefaultOnResponse::new().level(Level::INFO))
}
