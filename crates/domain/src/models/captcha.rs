//! CAPTCHA verification outcome, normalized across providers.

use serde::Serialize;

/// Error code for connection failures and timeouts.
pub const NETWORK_ERROR: &str = "network-error";
/// Error code for non-2xx provider responses.
pub const HTTP_ERROR: &str = "http-error";
/// Error code used when the provider omits one.
pub const UNKNOWN_ERROR: &str = "unknown-error";

/// Generic message for rejections without a specific mapping.
pub const GENERIC_FAILURE_MESSAGE: &str = "Verification failed, please try again";

/// Normalized result of a provider `siteverify` call.
///
/// A semantic rejection is a value with `success == false`, never an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptchaVerificationOutcome {
    pub success: bool,
    /// Present if and only if `success` is false.
    pub error_code: Option<String>,
    pub human_message: String,
    pub confidence_score: Option<f64>,
    pub challenge_timestamp: Option<String>,
    pub hostname: Option<String>,
    /// Unmodified provider response body.
    pub provider_payload: serde_json::Value,
}

impl CaptchaVerificationOutcome {
    pub fn accepted(payload: serde_json::Value) -> Self {
        Self {
            success: true,
            error_code: None,
            human_message: "Verification succeeded".to_string(),
            confidence_score: None,
            challenge_timestamp: None,
            hostname: None,
            provider_payload: payload,
        }
    }

    pub fn rejected(
        code: impl Into<String>,
        message: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            success: false,
            error_code: Some(code.into()),
            human_message: message.into(),
            confidence_score: None,
            challenge_timestamp: None,
            hostname: None,
            provider_payload: payload,
        }
    }

    /// Provider could not be reached.
    pub fn network_error() -> Self {
        Self::rejected(
            NETWORK_ERROR,
            "Network error while contacting the verification service, please retry",
            serde_json::Value::Null,
        )
    }

    /// Provider answered with a non-success HTTP status.
    pub fn http_error(status: u16) -> Self {
        Self::rejected(
            HTTP_ERROR,
            "The verification service is temporarily unavailable",
            serde_json::json!({ "status": status }),
        )
    }

    pub fn with_score(mut self, score: Option<f64>) -> Self {
        self.confidence_score = score;
        self
    }

    pub fn with_challenge(mut self, timestamp: Option<String>, hostname: Option<String>) -> Self {
        self.challenge_timestamp = timestamp;
        self.hostname = hostname;
        self
    }

    /// True for failures reaching the provider, as opposed to a rejected answer.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self.error_code.as_deref(),
            Some(NETWORK_ERROR) | Some(HTTP_ERROR)
        )
    }
}
