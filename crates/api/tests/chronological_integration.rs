//! Integration tests for chronological history endpoints.

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, TimeZone, Utc};
use common::{
    get_request_with_auth, json_request_with_auth, parse_response_body, record_location,
    TestApp, TestUser,
};
use serde_json::{json, Value};

async fn navigation(app: &TestApp, user: &TestUser, query: &str) -> Value {
    let response = app
        .send(get_request_with_auth(
            &format!("/api/v1/chronological/nav-availability?{}", query),
            &user.token,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    parse_response_body(response).await
}

async fn seeded() -> (TestApp, TestUser) {
    let app = TestApp::new();
    let alice = TestUser::new(&app, "alice");

    record_location(&app, &alice, Utc.with_ymd_and_hms(2024, 6, 14, 10, 0, 0).unwrap(), 48.14, 17.10).await;
    record_location(&app, &alice, Utc.with_ymd_and_hms(2024, 6, 15, 11, 55, 0).unwrap(), 48.15, 17.11).await;
    record_location(&app, &alice, Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap(), 48.16, 17.12).await;

    (app, alice)
}

#[tokio::test]
async fn test_day_listing_is_ascending_and_classified() {
    let (app, alice) = seeded().await;

    let response = app
        .send(get_request_with_auth(
            "/api/v1/chronological?dateType=day&year=2024&month=6&day=15",
            &alice.token,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_response_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["totalItems"], 2);
    assert_eq!(body["dateType"], "day");

    let data = body["data"].as_array().unwrap();
    assert_eq!(data[0]["liveness"], "historical");
    assert_eq!(data[1]["liveness"], "live");
    assert_eq!(data[1]["locationTimeThresholdMinutes"], 10);
}

#[tokio::test]
async fn test_latest_record_stops_being_live_after_threshold() {
    let (app, alice) = seeded().await;
    app.clock.advance(Duration::minutes(20));

    let response = app
        .send(get_request_with_auth(
            "/api/v1/chronological?dateType=day&year=2024&month=6&day=15",
            &alice.token,
        ))
        .await;
    let body = parse_response_body(response).await;
    let data = body["data"].as_array().unwrap();
    assert_eq!(data[1]["liveness"], "latest");
}

#[tokio::test]
async fn test_month_listing_spans_days() {
    let (app, alice) = seeded().await;

    let response = app
        .send(get_request_with_auth(
            "/api/v1/chronological?dateType=month&year=2024&month=6",
            &alice.token,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_response_body(response).await;
    assert_eq!(body["totalItems"], 3);
    let live: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|l| l["liveness"] == "live")
        .collect();
    assert_eq!(live.len(), 1);
}

#[tokio::test]
async fn test_missing_month_is_rejected() {
    let (app, alice) = seeded().await;

    let response = app
        .send(get_request_with_auth(
            "/api/v1/chronological?dateType=month&year=2024",
            &alice.token,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_impossible_date_is_rejected() {
    let (app, alice) = seeded().await;

    let response = app
        .send(get_request_with_auth(
            "/api/v1/chronological?dateType=day&year=2024&month=2&day=30",
            &alice.token,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_has_data() {
    let (app, alice) = seeded().await;

    let response = app
        .send(get_request_with_auth(
            "/api/v1/chronological/has-data?date=2024-06-14",
            &alice.token,
        ))
        .await;
    assert_eq!(parse_response_body(response).await["hasData"], true);

    let response = app
        .send(get_request_with_auth(
            "/api/v1/chronological/has-data?date=2024-06-13",
            &alice.token,
        ))
        .await;
    assert_eq!(parse_response_body(response).await["hasData"], false);
}

#[tokio::test]
async fn test_stats_for_day() {
    let (app, alice) = seeded().await;

    let response = app
        .send(get_request_with_auth(
            "/api/v1/chronological/stats?dateType=day&year=2024&month=6&day=15",
            &alice.token,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_response_body(response).await;
    assert_eq!(body["stats"]["totalLocations"], 2);
    assert_eq!(body["stats"]["countriesVisited"], 1);
    assert_eq!(body["stats"]["citiesVisited"], 1);
}

#[tokio::test]
async fn test_navigation_stops_at_today() {
    let (app, alice) = seeded().await;

    let response = app
        .send(get_request_with_auth(
            "/api/v1/chronological/nav-availability?dateType=day&year=2024&month=6&day=15",
            &alice.token,
        ))
        .await;
    let body = parse_response_body(response).await;
    assert_eq!(body["canNavigatePrevDay"], true);
    assert_eq!(body["canNavigateNextDay"], false);
    assert_eq!(body["canNavigateNextMonth"], false);
    assert_eq!(body["canNavigateNextYear"], false);

    let response = app
        .send(get_request_with_auth(
            "/api/v1/chronological/nav-availability?dateType=day&year=2024&month=6&day=14",
            &alice.token,
        ))
        .await;
    let body = parse_response_body(response).await;
    assert_eq!(body["canNavigateNextDay"], true);
}

#[tokio::test]
async fn test_day_view_month_and_year_steps_stop_at_landing_date() {
    let app = TestApp::new();
    let alice = TestUser::registered(&app, "alice").await;
    let june_15 = "dateType=day&year=2024&month=6&day=15";

    app.clock.set(Utc.with_ymd_and_hms(2024, 7, 10, 12, 0, 0).unwrap());
    let body = navigation(&app, &alice, june_15).await;
    assert_eq!(body["canNavigateNextDay"], true);
    assert_eq!(body["canNavigateNextMonth"], false);

    app.clock.set(Utc.with_ymd_and_hms(2024, 7, 15, 0, 0, 0).unwrap());
    let body = navigation(&app, &alice, june_15).await;
    assert_eq!(body["canNavigateNextMonth"], true);

    app.clock.set(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
    let body = navigation(&app, &alice, "dateType=day&year=2023&month=6&day=15").await;
    assert_eq!(body["canNavigateNextMonth"], true);
    assert_eq!(body["canNavigateNextYear"], false);

    let body = navigation(&app, &alice, "dateType=month&year=2023&month=6").await;
    assert_eq!(body["canNavigateNextYear"], true);
}

#[tokio::test]
async fn test_navigation_follows_viewer_offset() {
    let app = TestApp::new();
    let alice = TestUser::registered(&app, "alice").await;
    let june_15 = "dateType=day&year=2024&month=6&day=15";

    app.clock.set(Utc.with_ymd_and_hms(2024, 6, 15, 23, 0, 0).unwrap());
    let body = navigation(&app, &alice, june_15).await;
    assert_eq!(body["canNavigateNextDay"], false);

    let response = app
        .send(json_request_with_auth(
            Method::PUT,
            "/api/v1/users/me/settings",
            json!({ "utcOffsetMinutes": 120 }),
            &alice.token,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // 01:00 on June 16 for the viewer.
    let body = navigation(&app, &alice, june_15).await;
    assert_eq!(body["canNavigateNextDay"], true);
    assert_eq!(body["canNavigateNextMonth"], false);

    let response = app
        .send(json_request_with_auth(
            Method::PUT,
            "/api/v1/users/me/settings",
            json!({ "utcOffsetMinutes": -300 }),
            &alice.token,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // 18:00 on June 15 for the viewer.
    let body = navigation(&app, &alice, "dateType=day&year=2024&month=6&day=14").await;
    assert_eq!(body["canNavigateNextDay"], true);
    let body = navigation(&app, &alice, june_15).await;
    assert_eq!(body["canNavigateNextDay"], false);
}

#[tokio::test]
async fn test_history_is_private_to_its_owner() {
    let (app, _alice) = seeded().await;
    let bob = TestUser::new(&app, "bob");

    let response = app
        .send(get_request_with_auth(
            "/api/v1/chronological?dateType=month&year=2024&month=6",
            &bob.token,
        ))
        .await;
    let body = parse_response_body(response).await;
    assert_eq!(body["totalItems"], 0);
}
