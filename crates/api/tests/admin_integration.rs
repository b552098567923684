//! Integration tests for operator endpoints.

mod common;

use axum::http::{Method, StatusCode};
use common::{
    get_request, get_request_with_api_key, json_request, json_request_with_api_key,
    parse_response_body, TestApp, TEST_API_KEY, TEST_CHAT_ID,
};
use domain::models::JoinRequestStatus;
use domain::services::VerificationStore;
use serde_json::json;

#[tokio::test]
async fn test_stats_require_api_key() {
    let app = TestApp::new();

    let response = app.send(get_request("/api/v1/admin/stats")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_stats_count_by_status() {
    let app = TestApp::new();
    let approved = app.join_via_webhook(11).await;
    app.join_via_webhook(12).await;

    app.send(json_request(
        Method::POST,
        "/api/v1/verify",
        json!({ "token": &approved, "captcha_response": "solved" }),
    ))
    .await;

    let response = app
        .send(get_request_with_api_key("/api/v1/admin/stats", TEST_API_KEY))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_response_body(response).await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["pending"], 1);
    assert_eq!(body["approved"], 1);
    assert_eq!(body["rejected"], 0);
    assert_eq!(body["expired"], 0);
    assert_eq!(body["approval_rate"], 50.0);
}

#[tokio::test]
async fn test_stats_filtered_by_chat() {
    let app = TestApp::new();
    app.join_via_webhook(21).await;

    let uri = format!("/api/v1/admin/stats?chat_id={}", TEST_CHAT_ID);
    let body = parse_response_body(app.send(get_request_with_api_key(&uri, TEST_API_KEY)).await).await;
    assert_eq!(body["total"], 1);

    let body = parse_response_body(
        app.send(get_request_with_api_key(
            "/api/v1/admin/stats?chat_id=-42",
            TEST_API_KEY,
        ))
        .await,
    )
    .await;
    assert_eq!(body["total"], 0);
    assert_eq!(body["approval_rate"], 0.0);
}

#[tokio::test]
async fn test_reject_pending_request() {
    let app = TestApp::new();
    let token = app.join_via_webhook(31).await;

    let response = app
        .send(json_request_with_api_key(
            Method::POST,
            "/api/v1/admin/reject",
            json!({ "token": &token, "admin_id": 900 }),
            TEST_API_KEY,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(parse_response_body(response).await["rejected"], true);

    let request = app.store.find_join_request(&token).await.unwrap().unwrap();
    assert_eq!(request.status, JoinRequestStatus::Rejected);
    assert_eq!(request.processing_actor_id, Some(900));
    assert!(request.processed_time.is_some());

    // Already terminal.
    let again = app
        .send(json_request_with_api_key(
            Method::POST,
            "/api/v1/admin/reject",
            json!({ "token": &token, "admin_id": 900 }),
            TEST_API_KEY,
        ))
        .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
    assert_eq!(app.platform.approve_calls(), 0);
}

#[tokio::test]
async fn test_reject_unknown_token() {
    let app = TestApp::new();

    let response = app
        .send(json_request_with_api_key(
            Method::POST,
            "/api/v1/admin/reject",
            json!({ "token": "b".repeat(32), "admin_id": 1 }),
            TEST_API_KEY,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
