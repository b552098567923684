//! Cloudflare Turnstile.

use async_trait::async_trait;
use domain::models::captcha::UNKNOWN_ERROR;
use domain::models::CaptchaVerificationOutcome;
use domain::services::{CaptchaError, CaptchaVerifier};
use serde_json::{json, Map, Value};

use super::siteverify::{interpret, ProviderReply, RejectionVocabulary, SiteverifyClient};
use crate::config::TurnstileConfig;

pub const TURNSTILE_VERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";

fn turnstile_message(code: &str) -> String {
    let message = match code {
        "missing-input-secret" => "Configuration error: missing secret key",
        "invalid-input-secret" => "Configuration error: invalid secret key",
        "missing-input-response" => "Please complete the verification",
        "invalid-input-response" => "The verification has expired, please try again",
        "bad-request" => "Malformed verification request",
        "timeout-or-duplicate" => "The verification timed out or was submitted twice",
        "internal-error" => "Internal error, please try again",
        other => return format!("Verification failed: {}", other),
    };
    message.to_string()
}

const VOCABULARY: RejectionVocabulary = RejectionVocabulary {
    missing_codes: UNKNOWN_ERROR,
    message_for: turnstile_message,
};

pub struct TurnstileVerifier {
    http: SiteverifyClient,
    config: TurnstileConfig,
    verify_url: String,
}

impl TurnstileVerifier {
    pub fn new(config: &TurnstileConfig, http: SiteverifyClient) -> Self {
        Self {
            http,
            config: config.clone(),
            verify_url: TURNSTILE_VERIFY_URL.to_string(),
        }
    }

    pub fn with_verify_url(mut self, url: impl Into<String>) -> Self {
        self.verify_url = url.into();
        self
    }
}

#[async_trait]
impl CaptchaVerifier for TurnstileVerifier {
    fn provider_name(&self) -> &'static str {
        "turnstile"
    }

    async fn verify(
        &self,
        response_token: &str,
        remote_ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<CaptchaVerificationOutcome, CaptchaError> {
        // Turnstile accepts an empty remoteip.
        let form = [
            ("secret", self.config.secret_key.as_str()),
            ("response", response_token),
            ("remoteip", remote_ip.unwrap_or("")),
        ];

        match self
            .http
            .post_form(self.provider_name(), &self.verify_url, &form, user_agent)
            .await?
        {
            ProviderReply::Body(body) => interpret(self.provider_name(), body, &VOCABULARY),
            ProviderReply::Unreachable(outcome) => Ok(outcome),
        }
    }

    fn frontend_config(&self) -> Map<String, Value> {
        let mut config = Map::new();
        config.insert("provider".into(), json!("turnstile"));
        config.insert("siteKey".into(), json!(self.config.site_key));
        config.insert("theme".into(), json!(self.config.theme));
        config.insert("size".into(), json!(self.config.size));
        config.insert("language".into(), json!(self.config.language));
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            turnstile_message("internal-error"),
            "Internal error, please try again"
        );
        assert_eq!(turnstile_message("x-y"), "Verification failed: x-y");
    }

    #[test]
    fn test_frontend_config_uses_widget_settings() {
        let config = TurnstileConfig {
            site_key: "0x4AAA".into(),
            secret_key: "secret".into(),
            theme: "dark".into(),
            size: "compact".into(),
            language: "de".into(),
        };
        let verifier =
            TurnstileVerifier::new(&config, SiteverifyClient::new(5, "JoinGuard-Bot/1.0").unwrap());
        let frontend = verifier.frontend_config();
        assert_eq!(frontend["siteKey"], "0x4AAA");
        assert_eq!(frontend["theme"], "dark");
        assert_eq!(frontend["size"], "compact");
        assert_eq!(frontend["language"], "de");
    }
}
