use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::services::{StoreError, VerificationError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Verification attempt refused; `code` is machine-readable.
    #[error("Verification failed: {message}")]
    VerificationFailed { code: String, message: String },

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<ValidationDetail>>,
}

#[derive(Debug, Serialize)]
pub struct ValidationDetail {
    pub field: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized".into(), msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found".into(), msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict".into(), msg),
            ApiError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error".into(), msg)
            }
            ApiError::VerificationFailed { code, message } => {
                (StatusCode::BAD_REQUEST, code, message)
            }
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited".into(),
                "Too many requests. Please try again later.".into(),
            ),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error".into(),
                    "An internal error occurred".into(),
                )
            }
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable".into(),
                msg,
            ),
        };

        let body = ErrorBody {
            error: error_code,
            message,
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

impl From<VerificationError> for ApiError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::SessionNotFound => {
                ApiError::NotFound("Verification session not found".into())
            }
            VerificationError::SessionExpired => ApiError::VerificationFailed {
                code: "session_expired".into(),
                message: "Verification session has expired. Please request to join again.".into(),
            },
            VerificationError::AlreadyCompleted => {
                ApiError::Conflict("Verification already completed".into())
            }
            VerificationError::CaptchaRejected { code, message } => {
                ApiError::VerificationFailed { code, message }
            }
            VerificationError::CaptchaUnavailable { code, message } => {
                tracing::warn!(code = %code, "CAPTCHA provider unavailable");
                ApiError::ServiceUnavailable(message)
            }
            VerificationError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateToken | StoreError::Conflict => {
                ApiError::Conflict("Resource already exists".into())
            }
            StoreError::Backend(msg) => ApiError::Internal(format!("Store error: {}", msg)),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details: Vec<ValidationDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| ValidationDetail {
                    field: field.to_string(),
                    message: e
                        .message
                        .clone()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string()),
                })
            })
            .collect();

        let message = if details.len() == 1 {
            details[0].message.clone()
        } else {
            format!("{} validation errors", details.len())
        };

        ApiError::Validation(message)
    }
}
