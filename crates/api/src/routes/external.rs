//! Verification links issued on behalf of other bots.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use domain::models::{DisplayName, NewJoinAttempt, RequestOrigin};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::metrics::record_join_attempt;

/// External verifications are not tied to a chat.
pub const EXTERNAL_CHAT_ID: i64 = 0;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateVerificationRequest {
    #[validate(range(min = 1, message = "user_id must be a positive Telegram user id"))]
    pub user_id: i64,
    #[validate(length(max = 64))]
    pub username: Option<String>,
    #[validate(length(max = 128))]
    pub first_name: Option<String>,
    #[validate(length(max = 128))]
    pub last_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateVerificationResponse {
    pub token: String,
    pub verification_url: String,
    pub expires_at: DateTime<Utc>,
}

/// POST /api/v1/verification/create
pub async fn create_verification(
    State(state): State<AppState>,
    Json(request): Json<CreateVerificationRequest>,
) -> Result<(StatusCode, Json<CreateVerificationResponse>), ApiError> {
    request.validate()?;

    let issued = state
        .join_service
        .create_join_attempt(NewJoinAttempt {
            user_id: request.user_id,
            chat_id: EXTERNAL_CHAT_ID,
            display_name: DisplayName {
                username: request.username,
                first_name: request.first_name,
                last_name: request.last_name,
            },
            origin: RequestOrigin::ExternalApi,
        })
        .await?;
    record_join_attempt("external_api");

    Ok((
        StatusCode::CREATED,
        Json(CreateVerificationResponse {
            token: issued.token().to_string(),
            verification_url: state.config.verification_url(issued.token()),
            expires_at: issued.expires_at,
        }),
    ))
}
