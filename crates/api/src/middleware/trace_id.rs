//! Request ID propagation.

use axum::{
    body::Body,
    http::{header::HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

const MAX_REQUEST_ID_LENGTH: usize = 128;

/// Request ID stored in request extensions.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Accepts a caller-supplied request ID only if it is short and made of
/// `[A-Za-z0-9._-]`, so it can be logged and echoed safely.
fn sanitize_request_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_REQUEST_ID_LENGTH {
        return None;
    }
    trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .then(|| trimmed.to_string())
}

/// Reuses or generates an `X-Request-ID`, runs the request inside a span
/// carrying it, and echoes it on the response.
pub async fn trace_id(mut req: Request<Body>, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(sanitize_request_id)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(request_id.clone()));

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    let start = std::time::Instant::now();
    let mut response = next.run(req).instrument(span.clone()).await;

    span.in_scope(|| {
        tracing::info!(
            status = response.status().as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
    });

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-request-id"), header_value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_accepts_uuid() {
        let id = "550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(sanitize_request_id(id).as_deref(), Some(id));
    }

    #[test]
    fn test_sanitize_trims_whitespace() {
        assert_eq!(sanitize_request_id("  req_1.a  ").as_deref(), Some("req_1.a"));
    }

    #[test]
    fn test_sanitize_rejects_injection() {
        assert!(sanitize_request_id("abc\"} {\"admin\":true").is_none());
        assert!(sanitize_request_id("line\nbreak").is_none());
        assert!(sanitize_request_id("").is_none());
    }

    #[test]
    fn test_sanitize_rejects_oversized() {
        let long = "a".repeat(MAX_REQUEST_ID_LENGTH + 1);
        assert!(sanitize_request_id(&long).is_none());
    }
}
