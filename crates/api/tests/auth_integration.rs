//! Integration tests for authentication, health checks and request ids.

mod common;

use axum::http::{header, Method, Request, StatusCode};
use common::{get_request, get_request_with_auth, parse_response_body, TestApp, TestUser};
use shared::jwt::JwtConfig;
use uuid::Uuid;

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = TestApp::new();

    let response = app.send(get_request("/api/v1/users/me/settings")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_malformed_authorization_header() {
    let app = TestApp::new();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/v1/groups")
        .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_rejected() {
    let app = TestApp::new();
    let foreign = JwtConfig::new("some-other-secret-entirely", 3600, 0).unwrap();
    let (token, _) = foreign
        .generate_access_token(Uuid::new_v4(), "mallory")
        .unwrap();

    let response = app
        .send(get_request_with_auth("/api/v1/groups", &token))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_username_taken_by_another_id_is_rejected() {
    let app = TestApp::new();
    let _alice = TestUser::registered(&app, "alice").await;
    let impostor = TestUser::new(&app, "alice");

    let response = app
        .send(get_request_with_auth("/api/v1/users/me/settings", &impostor.token))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_endpoints_need_no_auth() {
    let app = TestApp::new();

    let response = app.send(get_request("/api/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"], "memory");

    let response = app.send(get_request("/api/health/live")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.send(get_request("/api/health/ready")).await;
    assert_eq!(parse_response_body(response).await["status"], "ready");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = TestApp::new();

    let request = Request::builder()
        .uri("/api/health/live")
        .header("x-request-id", "req-123")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.headers()["x-request-id"], "req-123");

    let response = app.send(get_request("/api/health/live")).await;
    assert!(response.headers().contains_key("x-request-id"));
}
