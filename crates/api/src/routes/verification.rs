//! Member-facing verification endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use domain::models::VerificationStatus;
use domain::services::{VerificationError, VerificationSubmission};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::ClientInfo;
use crate::middleware::metrics::{record_approval, record_verification_result};

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyRequest {
    #[validate(custom(function = "shared::validation::validate_verification_token"))]
    pub token: String,
    #[validate(custom(function = "shared::validation::validate_captcha_response"))]
    pub captcha_response: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub message: String,
    /// Whether the member was also admitted. Verification stands either way.
    pub approved: bool,
}

#[derive(Debug, Serialize)]
pub struct CaptchaConfigResponse {
    pub provider: &'static str,
    pub captcha: Map<String, Value>,
}

fn result_label(err: &VerificationError) -> &'static str {
    match err {
        VerificationError::SessionNotFound => "not_found",
        VerificationError::SessionExpired => "expired",
        VerificationError::AlreadyCompleted => "already_completed",
        VerificationError::CaptchaRejected { .. } => "rejected",
        VerificationError::CaptchaUnavailable { .. } => "unavailable",
        VerificationError::Internal(_) => "error",
    }
}

/// Submit a solved challenge.
///
/// POST /api/v1/verify
pub async fn verify(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    request.validate()?;

    let submission = VerificationSubmission {
        token: request.token,
        captcha_response: request.captcha_response,
        client_ip: client.ip.map(|ip| ip.to_string()),
        user_agent: client.user_agent,
    };

    let attempted = match state.verification.complete_verification(submission).await {
        Ok(attempted) => attempted,
        Err(err) => {
            record_verification_result(result_label(&err));
            return Err(err.into());
        }
    };
    record_verification_result("success");

    let approval = &attempted.approval;
    let message = if approval.success {
        record_approval("approved");
        "Verification successful. You have been approved to join."
    } else {
        let reason = approval
            .failure_reason
            .as_ref()
            .map(|r| r.as_str())
            .unwrap_or("unknown");
        record_approval(reason);
        "Verification successful, but automatic approval failed. An administrator will review your request."
    };

    Ok(Json(VerifyResponse {
        success: true,
        message: message.to_string(),
        approved: approval.success,
    }))
}

/// Public state of a token.
///
/// GET /api/v1/verification-status/:token
pub async fn verification_status(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<VerificationStatus>, ApiError> {
    shared::validation::validate_verification_token(&token)
        .map_err(|_| ApiError::NotFound("Verification session not found".into()))?;

    state
        .join_service
        .query_status(&token)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Verification session not found".into()))
}

/// Widget settings for the verification page. Never includes the secret.
///
/// GET /api/v1/captcha-config
pub async fn captcha_config(State(state): State<AppState>) -> Json<CaptchaConfigResponse> {
    Json(CaptchaConfigResponse {
        provider: state.captcha.provider_name(),
        captcha: state.captcha.frontend_config(),
    })
}
