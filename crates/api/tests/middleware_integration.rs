//! Integration tests for health probes and the global middleware stack.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::{get_request, parse_response_body, TestApp};
use serde_json::json;

fn verify_from(ip: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/verify")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Forwarded-For", ip)
        .body(Body::from(
            json!({ "token": "q".repeat(32), "captcha_response": "solved" }).to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_store_and_provider() {
    let app = TestApp::new();

    let response = app.send(get_request("/api/health")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_response_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["connected"], true);
    assert_eq!(body["captcha"]["provider"], "mock");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_liveness_and_readiness() {
    let app = TestApp::new();

    let live = app.send(get_request("/api/health/live")).await;
    assert_eq!(live.status(), StatusCode::OK);
    assert_eq!(parse_response_body(live).await["status"], "alive");

    let ready = app.send(get_request("/api/health/ready")).await;
    assert_eq!(ready.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_security_headers_applied() {
    let app = TestApp::new();

    let response = app.send(get_request("/api/health/live")).await;
    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["referrer-policy"], "no-referrer");
}

#[tokio::test]
async fn test_request_id_echoed() {
    let app = TestApp::new();

    let request = Request::builder()
        .uri("/api/health/live")
        .header("X-Request-ID", "edge-7f3a.1")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.headers()["x-request-id"], "edge-7f3a.1");

    let response = app.send(get_request("/api/health/live")).await;
    let generated = response.headers()["x-request-id"].to_str().unwrap();
    assert!(!generated.is_empty());
}

#[tokio::test]
async fn test_unknown_route_not_found() {
    let app = TestApp::new();

    let response = app.send(get_request("/api/v1/does-not-exist")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_verify_rate_limited_per_client() {
    let app = TestApp::with_overrides(&[("security.verify_rate_limit_per_minute", "1")]);

    let first = app.send(verify_from("203.0.113.7")).await;
    assert_eq!(first.status(), StatusCode::NOT_FOUND);

    let second = app.send(verify_from("203.0.113.7")).await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(parse_response_body(second).await["error"], "rate_limited");

    // Separate bucket per client.
    let other = app.send(verify_from("198.51.100.20")).await;
    assert_eq!(other.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rate_limit_only_covers_verify() {
    let app = TestApp::with_overrides(&[("security.verify_rate_limit_per_minute", "1")]);

    for _ in 0..3 {
        let response = app.send(get_request("/api/v1/captcha-config")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
