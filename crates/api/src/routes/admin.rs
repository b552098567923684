//! Operator endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use domain::models::VerificationStats;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub chat_id: Option<i64>,
}

/// Counts by status, for one chat or all of them.
///
/// GET /api/v1/admin/stats[?chat_id=]
pub async fn stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<VerificationStats>, ApiError> {
    Ok(Json(state.join_service.stats(query.chat_id).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectRequest {
    #[validate(custom(function = "shared::validation::validate_verification_token"))]
    pub token: String,
    /// Platform user id of the operator, recorded as the processing actor.
    pub admin_id: i64,
}

#[derive(Debug, Serialize)]
pub struct RejectResponse {
    pub rejected: bool,
}

/// Rejects a pending request locally. Nothing is sent to the platform.
///
/// POST /api/v1/admin/reject
pub async fn reject(
    State(state): State<AppState>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<RejectResponse>, ApiError> {
    request.validate()?;

    if state.join_service.reject(&request.token, request.admin_id).await? {
        Ok(Json(RejectResponse { rejected: true }))
    } else {
        Err(ApiError::Conflict(
            "Join request not found or no longer pending".into(),
        ))
    }
}
