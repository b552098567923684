use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use chrono::Duration as ChronoDuration;
use domain::services::{
    ApprovalOrchestrator, ApprovalSettings, CaptchaVerifier, ChatPlatform, JoinAttemptService,
    VerificationOrchestrator, VerificationStore,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{
    metrics_handler, metrics_middleware, rate_limit_middleware, require_api_key,
    security_headers_middleware, trace_id, RateLimiterState,
};
use crate::routes::{admin, external, health, telegram_webhook, verification};

/// Shared handler state. Collaborators are trait objects so the same router
/// runs against PostgreSQL and Telegram in production and in-memory fakes
/// in tests.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn VerificationStore>,
    pub captcha: Arc<dyn CaptchaVerifier>,
    pub platform: Arc<dyn ChatPlatform>,
    pub join_service: Arc<JoinAttemptService>,
    pub verification: Arc<VerificationOrchestrator>,
    pub rate_limiter: Option<Arc<RateLimiterState>>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn VerificationStore>,
        captcha: Arc<dyn CaptchaVerifier>,
        platform: Arc<dyn ChatPlatform>,
    ) -> Self {
        let settings = ApprovalSettings {
            claim_lease: ChronoDuration::seconds(config.verification.approval_claim_lease_secs),
            send_welcome: config.telegram.send_welcome_message,
        };
        let approval = Arc::new(ApprovalOrchestrator::new(
            store.clone(),
            platform.clone(),
            settings,
        ));
        let verification = Arc::new(VerificationOrchestrator::new(
            store.clone(),
            captcha.clone(),
            approval,
        ));
        let join_service = Arc::new(JoinAttemptService::new(
            store.clone(),
            ChronoDuration::seconds(config.verification.ttl_secs),
        ));
        let rate_limiter =
            RateLimiterState::new(config.security.verify_rate_limit_per_minute).map(Arc::new);

        Self {
            config: Arc::new(config),
            store,
            captcha,
            platform,
            join_service,
            verification,
            rate_limiter,
        }
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.security.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    // Rate limited per client IP
    let verify_routes = Router::new()
        .route("/api/v1/verify", post(verification::verify))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    let public_routes = Router::new()
        .route(
            "/api/v1/verification-status/:token",
            get(verification::verification_status),
        )
        .route("/api/v1/captcha-config", get(verification::captcha_config))
        .route(
            "/api/v1/telegram/webhook",
            post(telegram_webhook::handle_update),
        )
        .route("/api/health", get(health::health_check))
        .route("/api/health/live", get(health::live))
        .route("/api/health/ready", get(health::ready))
        .route("/metrics", get(metrics_handler));

    // Require X-API-Key
    let key_routes = Router::new()
        .route(
            "/api/v1/verification/create",
            post(external::create_verification),
        )
        .route("/api/v1/admin/stats", get(admin::stats))
        .route("/api/v1/admin/reject", post(admin::reject))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .merge(public_routes)
        .merge(verify_routes)
        .merge(key_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            security_headers_middleware,
        ))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors_layer(&config))
        .with_state(state)
}
