//! Common validation utilities.

use validator::ValidationError;

use crate::crypto::TOKEN_LENGTH;

/// Upper bound on a raw CAPTCHA response accepted from a client.
pub const MAX_CAPTCHA_RESPONSE_LENGTH: usize = 8192;

/// Validates that a string has the shape of an issued verification token.
pub fn validate_verification_token(token: &str) -> Result<(), ValidationError> {
    if token.len() == TOKEN_LENGTH && token.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("token_format");
        err.message = Some("Token must be 32 alphanumeric characters".into());
        Err(err)
    }
}

/// Validates that a CAPTCHA response is non-blank and bounded.
pub fn validate_captcha_response(response: &str) -> Result<(), ValidationError> {
    if response.trim().is_empty() {
        let mut err = ValidationError::new("captcha_response_empty");
        err.message = Some("CAPTCHA response is required".into());
        return Err(err);
    }
    if response.len() > MAX_CAPTCHA_RESPONSE_LENGTH {
        let mut err = ValidationError::new("captcha_response_length");
        err.message = Some("CAPTCHA response is too long".into());
        return Err(err);
    }
    Ok(())
}
