//! CAPTCHA providers behind the domain `CaptchaVerifier` seam.

pub mod cap;
pub mod hcaptcha;
pub mod siteverify;
pub mod turnstile;

use async_trait::async_trait;
use domain::models::CaptchaVerificationOutcome;
use domain::services::{CaptchaError, CaptchaVerifier};
use serde_json::{Map, Value};

pub use cap::CapVerifier;
pub use hcaptcha::HCaptchaVerifier;
pub use siteverify::SiteverifyClient;
pub use turnstile::TurnstileVerifier;

use crate::config::CaptchaConfig;

/// The configured provider. Selected once at startup.
pub enum CaptchaProvider {
    HCaptcha(HCaptchaVerifier),
    Turnstile(TurnstileVerifier),
    Cap(CapVerifier),
}

impl CaptchaProvider {
    pub fn from_config(config: &CaptchaConfig) -> Result<Self, CaptchaError> {
        let http = SiteverifyClient::new(config.timeout_secs, &config.user_agent)?;

        let provider = match config.provider.to_lowercase().as_str() {
            "hcaptcha" => Self::HCaptcha(HCaptchaVerifier::new(&config.hcaptcha, http)),
            "turnstile" => Self::Turnstile(TurnstileVerifier::new(&config.turnstile, http)),
            "cap" => Self::Cap(CapVerifier::new(&config.cap, http)),
            other => {
                return Err(CaptchaError::Internal(format!(
                    "Unknown CAPTCHA provider: {}",
                    other
                )))
            }
        };

        tracing::info!(provider = provider.provider_name(), "CAPTCHA provider configured");
        Ok(provider)
    }

    fn inner(&self) -> &dyn CaptchaVerifier {
        match self {
            Self::HCaptcha(v) => v,
            Self::Turnstile(v) => v,
            Self::Cap(v) => v,
        }
    }
}

#[async_trait]
impl CaptchaVerifier for CaptchaProvider {
    fn provider_name(&self) -> &'static str {
        self.inner().provider_name()
    }

    async fn verify(
        &self,
        response_token: &str,
        remote_ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<CaptchaVerificationOutcome, CaptchaError> {
        self.inner()
            .verify(response_token, remote_ip, user_agent)
            .await
    }

    fn frontend_config(&self) -> Map<String, Value> {
        self.inner().frontend_config()
    }
}
