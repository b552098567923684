use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    pub verification: VerificationConfig,
    pub captcha: CaptchaConfig,
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Public origin of the verification page, used to build links.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn pool_config(&self) -> persistence::db::DatabaseConfig {
        persistence::db::DatabaseConfig {
            url: self.url.clone(),
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            connect_timeout_secs: self.connect_timeout_secs,
            idle_timeout_secs: self.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Verification submissions allowed per client IP per minute. 0 disables.
    #[serde(default = "default_verify_rate_limit")]
    pub verify_rate_limit_per_minute: u32,

    /// Key for the external and admin API. Empty disables those routes.
    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub hsts_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerificationConfig {
    /// Session lifetime in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: i64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// How long an approval claim blocks other callers.
    #[serde(default = "default_claim_lease")]
    pub approval_claim_lease_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    /// One of `hcaptcha`, `turnstile`, `cap`.
    #[serde(default = "default_captcha_provider")]
    pub provider: String,

    #[serde(default = "default_captcha_timeout")]
    pub timeout_secs: u64,

    /// User-Agent sent to the provider when the member's is unknown.
    #[serde(default = "default_captcha_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub hcaptcha: HCaptchaConfig,

    #[serde(default)]
    pub turnstile: TurnstileConfig,

    #[serde(default)]
    pub cap: CapConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HCaptchaConfig {
    #[serde(default)]
    pub site_key: String,
    #[serde(default)]
    pub secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TurnstileConfig {
    #[serde(default)]
    pub site_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_widget_theme")]
    pub theme: String,
    #[serde(default = "default_widget_size")]
    pub size: String,
    #[serde(default = "default_widget_language")]
    pub language: String,
}

impl Default for TurnstileConfig {
    fn default() -> Self {
        Self {
            site_key: String::new(),
            secret_key: String::new(),
            theme: default_widget_theme(),
            size: default_widget_size(),
            language: default_widget_language(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CapConfig {
    /// Base URL of the self-hosted Cap server.
    #[serde(default)]
    pub server_url: String,
    #[serde(default)]
    pub site_key: String,
    #[serde(default)]
    pub secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,

    #[serde(default = "default_telegram_api_base")]
    pub api_base_url: String,

    #[serde(default = "default_telegram_timeout")]
    pub timeout_secs: u64,

    /// Expected `X-Telegram-Bot-Api-Secret-Token`. Empty skips the check.
    #[serde(default)]
    pub webhook_secret: String,

    #[serde(default = "default_true")]
    pub send_welcome_message: bool,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    2
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_verify_rate_limit() -> u32 {
    30
}
fn default_ttl_secs() -> i64 {
    600
}
fn default_sweep_interval() -> u64 {
    60
}
fn default_claim_lease() -> i64 {
    120
}
fn default_captcha_provider() -> String {
    "hcaptcha".to_string()
}
fn default_captcha_timeout() -> u64 {
    30
}
fn default_captcha_user_agent() -> String {
    "JoinGuard-Bot/1.0".to_string()
}
fn default_widget_theme() -> String {
    "light".to_string()
}
fn default_widget_size() -> String {
    "normal".to_string()
}
fn default_widget_language() -> String {
    "auto".to_string()
}
fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}
fn default_telegram_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml
    /// 2. config/local.toml (optional, not in git)
    /// 3. Environment variables with JG__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("JG")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("security.cors_origins")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration from embedded defaults plus overrides, without
    /// touching the file system. Validation is skipped.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            request_timeout_secs = 30
            public_base_url = "https://verify.example.com"

            [database]
            url = ""

            [logging]
            level = "info"
            format = "json"

            [security]
            cors_origins = []
            verify_rate_limit_per_minute = 0
            api_key = "test-api-key"

            [verification]
            ttl_secs = 600
            sweep_interval_secs = 60
            approval_claim_lease_secs = 120

            [captcha]
            provider = "hcaptcha"
            timeout_secs = 30

            [captcha.hcaptcha]
            site_key = "10000000-ffff-ffff-ffff-000000000001"
            secret_key = "0x0000000000000000000000000000000000000000"

            [telegram]
            bot_token = "123456:TEST"
            webhook_secret = ""
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "JG__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if self.verification.ttl_secs <= 0 {
            return Err(ConfigValidationError::InvalidValue(
                "verification.ttl_secs must be positive".to_string(),
            ));
        }

        if self.verification.sweep_interval_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "verification.sweep_interval_secs must be positive".to_string(),
            ));
        }

        if self.telegram.bot_token.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "JG__TELEGRAM__BOT_TOKEN environment variable must be set".to_string(),
            ));
        }

        self.validate_captcha()
    }

    fn validate_captcha(&self) -> Result<(), ConfigValidationError> {
        let captcha = &self.captcha;
        let (site_key, secret_key) = match captcha.provider.to_lowercase().as_str() {
            "hcaptcha" => (&captcha.hcaptcha.site_key, &captcha.hcaptcha.secret_key),
            "turnstile" => (&captcha.turnstile.site_key, &captcha.turnstile.secret_key),
            "cap" => {
                if captcha.cap.server_url.is_empty() {
                    return Err(ConfigValidationError::MissingRequired(
                        "captcha.cap.server_url is required for the cap provider".to_string(),
                    ));
                }
                (&captcha.cap.site_key, &captcha.cap.secret_key)
            }
            _ => {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "Unknown CAPTCHA provider '{}' (expected hcaptcha, turnstile or cap)",
                    captcha.provider
                )))
            }
        };

        if site_key.is_empty() || secret_key.is_empty() {
            return Err(ConfigValidationError::MissingRequired(format!(
                "captcha.{}.site_key and secret_key must be set",
                captcha.provider
            )));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }

    /// Link a member follows to solve the challenge.
    pub fn verification_url(&self, token: &str) -> String {
        format!(
            "{}/verify?token={}",
            self.server.public_base_url.trim_end_matches('/'),
            token
        )
    }

    /// External and admin routes are served only when an API key is configured.
    pub fn api_key_enabled(&self) -> bool {
        !self.security.api_key.is_empty()
    }
}
