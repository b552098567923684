//! hCaptcha.

use async_trait::async_trait;
use domain::models::captcha::UNKNOWN_ERROR;
use domain::models::CaptchaVerificationOutcome;
use domain::services::{CaptchaError, CaptchaVerifier};
use serde_json::{json, Map, Value};

use super::siteverify::{interpret, ProviderReply, RejectionVocabulary, SiteverifyClient};
use crate::config::HCaptchaConfig;

pub const HCAPTCHA_VERIFY_URL: &str = "https://hcaptcha.com/siteverify";
const HCAPTCHA_SCRIPT_URL: &str = "https://js.hcaptcha.com/1/api.js";

fn hcaptcha_message(code: &str) -> String {
    let message = match code {
        "missing-input-secret" => "Configuration error: missing secret key",
        "invalid-input-secret" => "Configuration error: invalid secret key",
        "missing-input-response" => "Please complete the verification",
        "invalid-input-response" => "The verification has expired, please try again",
        "bad-request" => "Malformed verification request",
        "invalid-or-already-seen-response" => {
            "The verification has expired or was already used, please try again"
        }
        "not-using-dummy-passcode" => "Verification failed",
        "sitekey-secret-mismatch" => "Configuration error: site key and secret do not match",
        "timeout-or-duplicate" => "The verification timed out or was submitted twice",
        other => return format!("Verification failed: {}", other),
    };
    message.to_string()
}

const VOCABULARY: RejectionVocabulary = RejectionVocabulary {
    missing_codes: UNKNOWN_ERROR,
    message_for: hcaptcha_message,
};

pub struct HCaptchaVerifier {
    http: SiteverifyClient,
    site_key: String,
    secret_key: String,
    verify_url: String,
}

impl HCaptchaVerifier {
    pub fn new(config: &HCaptchaConfig, http: SiteverifyClient) -> Self {
        Self {
            http,
            site_key: config.site_key.clone(),
            secret_key: config.secret_key.clone(),
            verify_url: HCAPTCHA_VERIFY_URL.to_string(),
        }
    }

    /// Points verification at another endpoint.
    pub fn with_verify_url(mut self, url: impl Into<String>) -> Self {
        self.verify_url = url.into();
        self
    }
}

#[async_trait]
impl CaptchaVerifier for HCaptchaVerifier {
    fn provider_name(&self) -> &'static str {
        "hcaptcha"
    }

    async fn verify(
        &self,
        response_token: &str,
        remote_ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<CaptchaVerificationOutcome, CaptchaError> {
        let mut form = vec![
            ("secret", self.secret_key.as_str()),
            ("response", response_token),
            ("sitekey", self.site_key.as_str()),
        ];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

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
        config.insert("provider".into(), json!("hcaptcha"));
        config.insert("siteKey".into(), json!(self.site_key));
        config.insert("scriptUrl".into(), json!(HCAPTCHA_SCRIPT_URL));
        config.insert("theme".into(), json!("light"));
        config.insert("size".into(), json!("normal"));
        config
    }
}
