//! CAPTCHA verification seam.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::models::CaptchaVerificationOutcome;

/// Unexpected verifier failures. Rejections are outcomes, not errors.
#[derive(Debug, thiserror::Error)]
pub enum CaptchaError {
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("CAPTCHA verifier error: {0}")]
    Internal(String),
}

/// A human-verification provider.
#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// Short provider name, e.g. `"hcaptcha"`.
    fn provider_name(&self) -> &'static str;

    /// Checks a client-supplied response token with the provider.
    ///
    /// Never retries internally.
    async fn verify(
        &self,
        response_token: &str,
        remote_ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<CaptchaVerificationOutcome, CaptchaError>;

    /// Settings the verification page needs to render the widget.
    fn frontend_config(&self) -> Map<String, Value>;
}

/// Scripted verifier for development and testing.
///
/// Returns queued outcomes in order, then the fallback for every later call.
#[derive(Debug)]
pub struct MockCaptchaVerifier {
    script: Mutex<VecDeque<CaptchaVerificationOutcome>>,
    fallback: CaptchaVerificationOutcome,
    calls: AtomicUsize,
}

impl MockCaptchaVerifier {
    /// Accepts every response.
    pub fn accepting() -> Self {
        Self::scripted(
            Vec::new(),
            CaptchaVerificationOutcome::accepted(Value::Null),
        )
    }

    /// Rejects every response with the given vendor code.
    pub fn rejecting(code: &str) -> Self {
        Self::scripted(
            Vec::new(),
            CaptchaVerificationOutcome::rejected(code, "Verification failed", Value::Null),
        )
    }

    pub fn scripted(
        outcomes: Vec<CaptchaVerificationOutcome>,
        fallback: CaptchaVerificationOutcome,
    ) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `verify` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptchaVerifier for MockCaptchaVerifier {
    fn provider_name(&self) -> &'static str {
        "mock"
    }

    async fn verify(
        &self,
        response_token: &str,
        _remote_ip: Option<&str>,
        _user_agent: Option<&str>,
    ) -> Result<CaptchaVerificationOutcome, CaptchaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            response_len = response_token.len(),
            "Mock: verifying CAPTCHA response"
        );
        let next = self.script.lock().await.pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }

    fn frontend_config(&self) -> Map<String, Value> {
        let mut config = Map::new();
        config.insert("provider".into(), Value::String("mock".into()));
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_then_fallback() {
        let verifier = MockCaptchaVerifier::scripted(
            vec![CaptchaVerificationOutcome::rejected(
                "timeout-or-duplicate",
                "expired",
                Value::Null,
            )],
            CaptchaVerificationOutcome::accepted(Value::Null),
        );

        assert!(!verifier.verify("r", None, None).await.unwrap().success);
        assert!(verifier.verify("r", None, None).await.unwrap().success);
        assert!(verifier.verify("r", None, None).await.unwrap().success);
        assert_eq!(verifier.calls(), 3);
    }

    #[tokio::test]
    async fn test_rejecting() {
        let verifier = MockCaptchaVerifier::rejecting("invalid-input-response");
        let outcome = verifier.verify("r", Some("127.0.0.1"), None).await.unwrap();
        assert_eq!(outcome.error_code.as_deref(), Some("invalid-input-response"));
        assert_eq!(verifier.frontend_config()["provider"], "mock");
    }
}
