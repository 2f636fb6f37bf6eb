//! Admission middleware: assigns/echoes `X-Request-Id` and
//! opens a tracing span so every log line inside a handler is correlated.

use axum::body::Body;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;

use crate::request_context::resolve_request_id;

pub async fn request_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let request_id = resolve_request_id(request.headers());
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        request.headers_mut().insert("x-request-id", value);
    }

    let span = tracing::info_span!("request", request_id = %request_id, method = %request.method(), path = %request.uri().path());
    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}
