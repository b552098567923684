//! Telegram webhook receiver.

use axum::{extract::State, http::HeaderMap, Json};
use domain::models::{DisplayName, NewJoinAttempt, RequestOrigin};
use serde_json::{json, Value};
use shared::crypto::constant_time_eq;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::metrics::record_join_attempt;
use crate::services::telegram::{verification_prompt, ChatJoinRequest, Update};

pub const SECRET_TOKEN_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

fn secret_matches(headers: &HeaderMap, expected: &str) -> bool {
    if expected.is_empty() {
        return true;
    }
    headers
        .get(SECRET_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|provided| constant_time_eq(provided, expected))
}

/// POST /api/v1/telegram/webhook
///
/// Updates other than `chat_join_request` are acknowledged and ignored.
/// A store failure answers 500 so Telegram redelivers the update.
pub async fn handle_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> Result<Json<Value>, ApiError> {
    if !secret_matches(&headers, &state.config.telegram.webhook_secret) {
        tracing::warn!(update_id = update.update_id, "Webhook secret mismatch");
        return Err(ApiError::Unauthorized("Invalid webhook secret".into()));
    }

    if let Some(join_request) = update.chat_join_request {
        handle_join_request(&state, join_request).await?;
    } else {
        tracing::debug!(update_id = update.update_id, "Ignoring update");
    }

    Ok(Json(json!({ "ok": true })))
}

async fn handle_join_request(state: &AppState, request: ChatJoinRequest) -> Result<(), ApiError> {
    let user = request.from;
    tracing::info!(
        user_id = user.id,
        chat_id = request.chat.id,
        "Join request received"
    );

    let issued = state
        .join_service
        .create_join_attempt(NewJoinAttempt {
            user_id: user.id,
            chat_id: request.chat.id,
            display_name: DisplayName {
                username: user.username,
                first_name: Some(user.first_name),
                last_name: user.last_name,
            },
            origin: RequestOrigin::Platform,
        })
        .await?;
    record_join_attempt("platform");

    let url = state.config.verification_url(issued.token());
    let text = verification_prompt(
        request.chat.title.as_deref(),
        &url,
        state.join_service.ttl().num_minutes(),
    );
    let recipient = request.user_chat_id.unwrap_or(user.id);

    if let Err(e) = state.platform.send_direct_message(recipient, &text).await {
        tracing::warn!(
            user_id = user.id,
            chat_id = request.chat.id,
            error = %e,
            "Could not send verification link"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_secret_not_configured_accepts_all() {
        assert!(secret_matches(&HeaderMap::new(), ""));
    }

    #[test]
    fn test_secret_checked_when_configured() {
        let mut headers = HeaderMap::new();
        assert!(!secret_matches(&headers, "s3cret"));

        headers.insert(SECRET_TOKEN_HEADER, HeaderValue::from_static("wrong"));
        assert!(!secret_matches(&headers, "s3cret"));

        headers.insert(SECRET_TOKEN_HEADER, HeaderValue::from_static("s3cret"));
        assert!(secret_matches(&headers, "s3cret"));
    }
}
