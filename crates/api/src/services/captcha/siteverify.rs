//! HTTP plumbing shared by the `siteverify`-style providers.

use std::time::Duration;

use domain::models::captcha::{CaptchaVerificationOutcome, UNKNOWN_ERROR};
use domain::services::CaptchaError;
use reqwest::{header, Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;

/// Fields the providers have in common. Everything else stays in the payload.
#[derive(Debug, Default, Deserialize)]
struct SiteverifyBody {
    #[serde(default)]
    success: bool,
    #[serde(rename = "error-codes")]
    error_codes: Option<Vec<String>>,
    challenge_ts: Option<String>,
    hostname: Option<String>,
    score: Option<f64>,
}

/// What came back from a provider call.
#[derive(Debug)]
pub enum ProviderReply {
    Body(Value),
    /// Transport or HTTP failure, already expressed as an outcome.
    Unreachable(CaptchaVerificationOutcome),
}

/// Pooled HTTP client with the service's fallback User-Agent.
#[derive(Debug, Clone)]
pub struct SiteverifyClient {
    client: Client,
    default_user_agent: String,
}

impl SiteverifyClient {
    pub fn new(timeout_secs: u64, default_user_agent: &str) -> Result<Self, CaptchaError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CaptchaError::Internal(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            default_user_agent: default_user_agent.to_string(),
        })
    }

    /// Form-encoded POST.
    pub async fn post_form(
        &self,
        provider: &'static str,
        url: &str,
        form: &[(&str, &str)],
        user_agent: Option<&str>,
    ) -> Result<ProviderReply, CaptchaError> {
        let request = self.client.post(url).form(form);
        self.send(provider, request, user_agent).await
    }

    /// JSON POST.
    pub async fn post_json(
        &self,
        provider: &'static str,
        url: &str,
        body: &Value,
        user_agent: Option<&str>,
    ) -> Result<ProviderReply, CaptchaError> {
        let request = self.client.post(url).json(body);
        self.send(provider, request, user_agent).await
    }

    /// `Err` only for a 2xx body that is not JSON.
    async fn send(
        &self,
        provider: &'static str,
        request: RequestBuilder,
        user_agent: Option<&str>,
    ) -> Result<ProviderReply, CaptchaError> {
        let user_agent = user_agent.unwrap_or(&self.default_user_agent);

        let response = match request.header(header::USER_AGENT, user_agent).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(provider, error = %e, "CAPTCHA provider request failed");
                return Ok(ProviderReply::Unreachable(
                    CaptchaVerificationOutcome::network_error(),
                ));
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::error!(provider, status = status.as_u16(), "CAPTCHA provider HTTP error");
            return Ok(ProviderReply::Unreachable(
                CaptchaVerificationOutcome::http_error(status.as_u16()),
            ));
        }

        match response.json::<Value>().await {
            Ok(body) => Ok(ProviderReply::Body(body)),
            Err(e) if e.is_decode() => Err(CaptchaError::InvalidResponse(format!(
                "{} returned an undecodable body: {}",
                provider, e
            ))),
            Err(e) => {
                tracing::error!(provider, error = %e, "CAPTCHA provider response interrupted");
                Ok(ProviderReply::Unreachable(
                    CaptchaVerificationOutcome::network_error(),
                ))
            }
        }
    }
}

/// How a provider names a rejection.
pub struct RejectionVocabulary {
    /// Code used when the body has no `error-codes` key at all.
    pub missing_codes: &'static str,
    pub message_for: fn(&str) -> String,
}

/// Turns a decoded provider body into an outcome.
pub fn interpret(
    provider: &'static str,
    body: Value,
    vocabulary: &RejectionVocabulary,
) -> Result<CaptchaVerificationOutcome, CaptchaError> {
    if !body.is_object() {
        return Err(CaptchaError::InvalidResponse(format!(
            "{} returned a non-object body",
            provider
        )));
    }

    let parsed: SiteverifyBody = serde_json::from_value(body.clone())
        .map_err(|e| CaptchaError::InvalidResponse(format!("{}: {}", provider, e)))?;

    if parsed.success {
        tracing::info!(provider, "CAPTCHA verification succeeded");
        return Ok(CaptchaVerificationOutcome::accepted(body)
            .with_challenge(parsed.challenge_ts, parsed.hostname)
            .with_score(parsed.score));
    }

    let code = match parsed.error_codes {
        None => vocabulary.missing_codes.to_string(),
        Some(codes) => codes
            .into_iter()
            .next()
            .unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
    };

    tracing::warn!(provider, code = %code, "CAPTCHA verification rejected");
    let message = (vocabulary.message_for)(&code);
    Ok(CaptchaVerificationOutcome::rejected(code, message, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo(code: &str) -> String {
        format!("msg:{}", code)
    }

    const VOCAB: RejectionVocabulary = RejectionVocabulary {
        missing_codes: UNKNOWN_ERROR,
        message_for: echo,
    };

    #[test]
    fn test_interpret_success_keeps_payload() {
        let body = json!({
            "success": true,
            "challenge_ts": "2026-01-01T00:00:00Z",
            "hostname": "verify.example.com",
            "score": 0.9,
            "credit": false
        });
        let outcome = interpret("test", body.clone(), &VOCAB).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.hostname.as_deref(), Some("verify.example.com"));
        assert_eq!(outcome.confidence_score, Some(0.9));
        assert_eq!(outcome.provider_payload, body);
    }

    #[test]
    fn test_interpret_first_error_code_wins() {
        let body = json!({"success": false, "error-codes": ["timeout-or-duplicate", "bad-request"]});
        let outcome = interpret("test", body, &VOCAB).unwrap();
        assert_eq!(outcome.error_code.as_deref(), Some("timeout-or-duplicate"));
        assert_eq!(outcome.human_message, "msg:timeout-or-duplicate");
    }

    #[test]
    fn test_interpret_empty_error_codes() {
        let outcome = interpret("test", json!({"success": false, "error-codes": []}), &VOCAB).unwrap();
        assert_eq!(outcome.error_code.as_deref(), Some(UNKNOWN_ERROR));
    }

    #[test]
    fn test_interpret_missing_success_is_rejection() {
        let outcome = interpret("test", json!({}), &VOCAB).unwrap();
        assert!(!outcome.success);
    }

    #[test]
    fn test_interpret_non_object_is_error() {
        assert!(interpret("test", json!([1, 2]), &VOCAB).is_err());
        assert!(interpret("test", json!({"success": "yes"}), &VOCAB).is_err());
    }
}
