//! Common test utilities for integration tests.
//!
//! Every test app runs on the in-memory store with a fixed clock, so tests
//! need no database and control "now" explicitly.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use domain::services::FixedClock;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;
use wayfarer_api::{
    app::{create_app, AppState, Stores},
    config::Config,
};

/// Noon UTC on 2024-06-15, the default "now" of test apps.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub clock: Arc<FixedClock>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_overrides(&[])
    }

    /// Test app with configuration overrides such as
    /// `("visibility.allow_anonymous_public_timeline", "true")`.
    pub fn with_overrides(overrides: &[(&str, &str)]) -> Self {
        let config = Config::load_for_test(overrides).expect("test config");
        let clock = Arc::new(FixedClock::new(test_now()));
        let stores = Stores::memory(clock.clone());
        let state = AppState::new(config, stores, clock.clone(), None).expect("app state");
        Self {
            router: create_app(state.clone()),
            state,
            clock,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

/// A caller with a signed access token.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: Uuid,
    pub username: String,
    pub token: String,
}

impl TestUser {
    pub fn new(app: &TestApp, username: &str) -> Self {
        let id = Uuid::new_v4();
        let (token, _jti) = app
            .state
            .jwt
            .generate_access_token(id, username)
            .expect("token");
        Self {
            id,
            username: username.to_string(),
            token,
        }
    }

    /// Creates the user and makes them known to the directory, which happens
    /// on their first authenticated request.
    pub async fn registered(app: &TestApp, username: &str) -> Self {
        let user = Self::new(app, username);
        let response = app
            .send(get_request_with_auth("/api/v1/users/me/settings", &user.token))
            .await;
        assert!(response.status().is_success());
        user
    }
}

/// Build a JSON request with authentication.
pub fn json_request_with_auth(
    method: Method,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Build a GET request with authentication.
pub fn get_request_with_auth(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

/// Build a GET request without credentials.
pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Build a DELETE request with authentication.
pub fn delete_request_with_auth(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

/// Helper to parse JSON response body.
pub async fn parse_response_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
}

/// Records a location for `user` captured at `at` (UTC) and returns its id.
pub async fn record_location(
    app: &TestApp,
    user: &TestUser,
    at: DateTime<Utc>,
    latitude: f64,
    longitude: f64,
) -> i64 {
    let response = app
        .send(json_request_with_auth(
            Method::POST,
            "/api/v1/locations",
            serde_json::json!({
                "timestamp": at.to_rfc3339(),
                "latitude": latitude,
                "longitude": longitude,
                "country": "Slovakia",
                "city": "Bratislava"
            }),
            &user.token,
        ))
        .await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    parse_response_body(response).await["id"].as_i64().unwrap()
}

/// Creates a group owned by `owner` and returns its id.
pub async fn create_group(app: &TestApp, owner: &TestUser, name: &str, group_type: &str) -> Uuid {
    let response = app
        .send(json_request_with_auth(
            Method::POST,
            "/api/v1/groups",
            serde_json::json!({ "name": name, "groupType": group_type }),
            &owner.token,
        ))
        .await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    let body = parse_response_body(response).await;
    body["id"].as_str().unwrap().parse().unwrap()
}

/// Invites `invitee` into the group and has them accept.
pub async fn join_group(app: &TestApp, owner: &TestUser, invitee: &TestUser, group_id: Uuid) {
    let response = app
        .send(json_request_with_auth(
            Method::POST,
            &format!("/api/v1/groups/{}/invitations", group_id),
            serde_json::json!({ "username": invitee.username }),
            &owner.token,
        ))
        .await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    let invitation = parse_response_body(response).await;
    let invitation_id = invitation["id"].as_str().unwrap();

    let response = app
        .send(json_request_with_auth(
            Method::POST,
            &format!("/api/v1/invitations/{}/accept", invitation_id),
            serde_json::json!({}),
            &invitee.token,
        ))
        .await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);
}
