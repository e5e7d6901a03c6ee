//! Correlation ID propagation (spec §4.6 / §6): extracted from the
//! `X-Correlation-ID` request header, generated if absent, echoed back on
//! the response, and carried into every log event for the request.

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;

pub const HEADER_NAME: &str = "x-correlation-id";

#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Middleware: extract-or-generate the correlation ID, stash it on the
/// request for handlers to pull out, and echo it back as a response
/// header regardless of how the handler completes.
pub async fn propagate(mut req: Request, next: Next) -> Response {
    let correlation_id = req
        .headers()
        .get(HEADER_NAME)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    req.extensions_mut().insert(CorrelationId(correlation_id.clone()));

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(HEADER_NAME), value);
    }
    response
}
