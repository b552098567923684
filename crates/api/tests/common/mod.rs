//! Common test utilities for integration tests.
//!
//! HTTP tests run the full router against the in-memory store and the mock
//! CAPTCHA verifier and chat platform. Store tests need PostgreSQL and are
//! skipped unless `TEST_DATABASE_URL` is set.

// Helpers are shared by several test binaries; not every binary uses all of them.
#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request},
    Router,
};
use domain::services::{InMemoryVerificationStore, MockCaptchaVerifier, MockChatPlatform};
use join_guard_api::app::{create_app, AppState};
use join_guard_api::config::Config;
use serde_json::{json, Value};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;

pub const TEST_API_KEY: &str = "test-api-key";
pub const TEST_CHAT_ID: i64 = -1001234567890;

/// Router plus handles on the fakes behind it.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryVerificationStore>,
    pub captcha: Arc<MockCaptchaVerifier>,
    pub platform: Arc<MockChatPlatform>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(&[], MockCaptchaVerifier::accepting(), MockChatPlatform::new())
    }

    pub fn with_overrides(overrides: &[(&str, &str)]) -> Self {
        Self::build(
            overrides,
            MockCaptchaVerifier::accepting(),
            MockChatPlatform::new(),
        )
    }

    pub fn build(
        overrides: &[(&str, &str)],
        captcha: MockCaptchaVerifier,
        platform: MockChatPlatform,
    ) -> Self {
        let config = Config::load_for_test(overrides).expect("test config");
        let store = Arc::new(InMemoryVerificationStore::new());
        let captcha = Arc::new(captcha);
        let platform = Arc::new(platform);

        let state = AppState::new(config, store.clone(), captcha.clone(), platform.clone());

        Self {
            router: create_app(state),
            store,
            captcha,
            platform,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> axum::response::Response {
        use tower::ServiceExt;
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// Delivers a `chat_join_request` update and returns the token that was
    /// sent to the member.
    pub async fn join_via_webhook(&self, user_id: i64) -> String {
        let response = self
            .send(json_request(
                Method::POST,
                "/api/v1/telegram/webhook",
                join_request_update(user_id, TEST_CHAT_ID),
            ))
            .await;
        assert_eq!(response.status(), axum::http::StatusCode::OK);

        let messages = self.platform.sent_messages().await;
        let (_, text) = messages
            .iter()
            .rev()
            .find(|(recipient, text)| *recipient == user_id && text.contains("token="))
            .expect("verification link sent");
        token_from_message(text)
    }
}

/// A Telegram update carrying one join request.
pub fn join_request_update(user_id: i64, chat_id: i64) -> Value {
    json!({
        "update_id": 10000 + user_id,
        "chat_join_request": {
            "chat": { "id": chat_id, "title": "Rust Builders", "type": "supergroup" },
            "from": {
                "id": user_id,
                "is_bot": false,
                "first_name": "Ferris",
                "username": "ferris"
            },
            "user_chat_id": user_id,
            "date": 1_700_000_000
        }
    })
}

/// Pulls the token out of the `verify?token=` link in a prompt.
pub fn token_from_message(text: &str) -> String {
    let start = text.find("token=").expect("link in message") + "token=".len();
    text[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Helper to create a JSON request.
pub fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

pub fn json_request_with_api_key(
    method: Method,
    uri: &str,
    body: Value,
    api_key: &str,
) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-API-Key", api_key)
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn get_request_with_api_key(uri: &str, api_key: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("X-API-Key", api_key)
        .body(Body::empty())
        .unwrap()
}

/// Helper to parse JSON response body.
pub async fn parse_response_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}

/// Create a test database pool, or `None` when no test database is configured.
pub async fn create_test_pool() -> Option<PgPool> {
    let database_url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) if !url.is_empty() => url,
        _ => {
            eprintln!("TEST_DATABASE_URL not set; skipping database test");
            return None;
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    persistence::db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    Some(pool)
}

/// A user id unlikely to collide with rows left by other tests.
pub fn unique_user_id() -> i64 {
    use rand::Rng;
    rand::thread_rng().gen_range(1_000_000..i64::from(i32::MAX))
}
