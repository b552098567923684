//! API key guard for the external and admin routes.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use shared::crypto::constant_time_eq;

use crate::app::AppState;
use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Requires `X-API-Key` to match the configured key. With no key
/// configured the routes behind this guard do not exist.
pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let expected = &state.config.security.api_key;
    if expected.is_empty() {
        return ApiError::NotFound("Not found".into()).into_response();
    }

    let authorized = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|key| constant_time_eq(key, expected));

    if !authorized {
        tracing::warn!(path = %req.uri().path(), "Rejected request with invalid API key");
        return ApiError::Unauthorized("Invalid or missing API key".into()).into_response();
    }

    next.run(req).await
}
