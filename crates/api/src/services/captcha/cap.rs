//! Self-hosted Cap server.

use async_trait::async_trait;
use domain::models::captcha::GENERIC_FAILURE_MESSAGE;
use domain::models::CaptchaVerificationOutcome;
use domain::services::{CaptchaError, CaptchaVerifier};
use serde_json::{json, Map, Value};

use super::siteverify::{interpret, ProviderReply, RejectionVocabulary, SiteverifyClient};
use crate::config::CapConfig;

fn cap_message(code: &str) -> String {
    match code {
        "missing-input-secret" => "Missing secret key configuration",
        "invalid-input-secret" => "Secret key configuration is invalid",
        "missing-input-response" => "Missing verification response",
        "invalid-input-response" => "Verification response is invalid",
        "bad-request" => "Malformed verification request",
        "timeout-or-duplicate" => "The verification timed out or was submitted twice",
        _ => GENERIC_FAILURE_MESSAGE,
    }
    .to_string()
}

const VOCABULARY: RejectionVocabulary = RejectionVocabulary {
    missing_codes: "verification-failed",
    message_for: cap_message,
};

pub struct CapVerifier {
    http: SiteverifyClient,
    server_url: String,
    site_key: String,
    secret_key: String,
}

impl CapVerifier {
    pub fn new(config: &CapConfig, http: SiteverifyClient) -> Self {
        Self {
            http,
            server_url: config.server_url.trim_end_matches('/').to_string(),
            site_key: config.site_key.clone(),
            secret_key: config.secret_key.clone(),
        }
    }

    /// Widget endpoint: `{server_url}/{site_key}/`.
    fn endpoint(&self) -> String {
        format!("{}/{}/", self.server_url, self.site_key)
    }
}

#[async_trait]
impl CaptchaVerifier for CapVerifier {
    fn provider_name(&self) -> &'static str {
        "cap"
    }

    async fn verify(
        &self,
        response_token: &str,
        remote_ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<CaptchaVerificationOutcome, CaptchaError> {
        let mut body = json!({
            "secret": self.secret_key,
            "response": response_token,
        });
        if let (Some(ip), Some(object)) = (remote_ip, body.as_object_mut()) {
            object.insert("remoteip".into(), json!(ip));
        }

        let url = format!("{}siteverify", self.endpoint());
        match self
            .http
            .post_json(self.provider_name(), &url, &body, user_agent)
            .await?
        {
            ProviderReply::Body(body) => interpret(self.provider_name(), body, &VOCABULARY),
            ProviderReply::Unreachable(outcome) => Ok(outcome),
        }
    }

    fn frontend_config(&self) -> Map<String, Value> {
        let mut config = Map::new();
        config.insert("provider".into(), json!("cap"));
        config.insert("server_url".into(), json!(self.server_url));
        config.insert("site_key".into(), json!(self.site_key));
        config.insert("endpoint".into(), json!(self.endpoint()));
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> CapVerifier {
        CapVerifier::new(
            &CapConfig {
                server_url: "https://cap.example.com/".into(),
                site_key: "abc123".into(),
                secret_key: "s3cret".into(),
            },
            SiteverifyClient::new(5, "JoinGuard-Bot/1.0").unwrap(),
        )
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        assert_eq!(verifier().endpoint(), "https://cap.example.com/abc123/");
    }

    #[test]
    fn test_unknown_code_uses_generic_message() {
        assert_eq!(cap_message("verification-failed"), GENERIC_FAILURE_MESSAGE);
        assert_eq!(cap_message("bad-request"), "Malformed verification request");
    }

    #[test]
    fn test_frontend_config() {
        let config = verifier().frontend_config();
        assert_eq!(config["provider"], "cap");
        assert_eq!(config["site_key"], "abc123");
        assert_eq!(config["endpoint"], "https://cap.example.com/abc123/");
    }
}
