// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Token refresh and history backfill loops.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Utc;
use common::{create_test_app, encoded_path, ride_json, test_user, ATHLETE_ID};
use serde_json::{json, Value};
use strava_daemon::services::strava::StopReason;
use strava_daemon::services::{BackfillReport, RefreshReport};
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_history(server: &MockServer, page: u32, body: Value, times: u64) {
    Mock::given(method("GET"))
        .and(path("/api/v3/athlete/activities"))
        .and(query_param("page", page.to_string()))
        .and(query_param("per_page", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(times)
        .mount(server)
        .await;
}

// ─── Token refresh ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_refresh_renews_expiring_tokens_only() {
    let server = MockServer::start().await;
    let app = create_test_app(&server.uri()).await;
    let now = Utc::now().timestamp();

    let mut expiring = test_user(1);
    expiring.expires_at = now + 60;
    let fresh = test_user(2);
    let mut broken = test_user(3);
    broken.expires_at = now - 60;

    app.store.insert_user(expiring).await;
    app.store.insert_user(fresh.clone()).await;
    app.store.insert_user(broken.clone()).await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-access-1",
            "refresh_token": "new-refresh-1",
            "expires_at": now + 21600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("refresh_token=refresh-3"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "Bad Request"})))
        .expect(1)
        .mount(&server)
        .await;

    let report = app.refresher.run_cycle().await;

    assert_eq!(
        report,
        RefreshReport {
            checked: 2,
            refreshed: 1,
            failed: 1,
        }
    );

    let refreshed = app.store.user(1).await.unwrap();
    assert_eq!(refreshed.access_token, "new-access-1");
    assert_eq!(refreshed.refresh_token, "new-refresh-1");
    assert_eq!(refreshed.expires_at, now + 21600);

    // Untouched
    assert_eq!(app.store.user(2).await.unwrap(), fresh);
    assert_eq!(app.store.user(3).await.unwrap(), broken);
}

#[tokio::test]
async fn test_refresh_keeps_refresh_token_when_not_rotated() {
    let server = MockServer::start().await;
    let app = create_test_app(&server.uri()).await;
    let now = Utc::now().timestamp();

    let mut user = test_user(1);
    user.expires_at = now;
    user.history_fetched = false;
    app.store.insert_user(user).await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-access",
            "expires_at": now + 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    app.refresher.run_cycle().await;

    let user = app.store.user(1).await.unwrap();
    assert_eq!(user.access_token, "new-access");
    assert_eq!(user.refresh_token, "refresh-1");
    // The history flag is not the refresher's to change
    assert!(!user.history_fetched);
}

// ─── Backfill ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_backfill_imports_history_and_marks_user() {
    let server = MockServer::start().await;
    let app = create_test_app(&server.uri()).await;

    let mut user = test_user(ATHLETE_ID);
    user.history_fetched = false;
    app.store.insert_user(user).await;
    app.store.insert_user(test_user(2)).await;

    let mut run = ride_json(3, &encoded_path(4), 900);
    run["type"] = json!("Run");
    mock_history(
        &server,
        1,
        json!([
            ride_json(1, &encoded_path(5), 500),
            ride_json(2, &encoded_path(8), 800),
            run,
        ]),
        1,
    )
    .await;
    mock_history(&server, 2, json!([]), 0).await;

    let report = app.backfill.run_cycle().await;

    assert_eq!(
        report,
        BackfillReport {
            users: 1,
            persisted: 2,
            rejected: 1,
            failed: 0,
            incomplete: 0,
            errors: 0,
        }
    );
    assert_eq!(app.store.contributions().await.len(), 2);
    assert!(app.store.user(ATHLETE_ID).await.unwrap().history_fetched);

    // Nothing left to do on the next cycle
    assert_eq!(app.backfill.run_cycle().await.users, 0);
}

#[tokio::test]
async fn test_backfill_skips_bad_activities() {
    let server = MockServer::start().await;
    let app = create_test_app(&server.uri()).await;

    let mut user = test_user(ATHLETE_ID);
    user.history_fetched = false;
    app.store.insert_user(user).await;

    let mut no_map = ride_json(2, "", 600);
    no_map["map"] = json!({"summary_polyline": ""});
    mock_history(
        &server,
        1,
        json!([ride_json(1, &encoded_path(5), 500), no_map]),
        1,
    )
    .await;

    let result = app.backfill.backfill_user(ATHLETE_ID).await.unwrap();

    assert_eq!(result.fetched, 2);
    assert_eq!(result.persisted, 1);
    assert_eq!(result.failed, 1);
    assert!(app.store.user(ATHLETE_ID).await.unwrap().history_fetched);
}

#[tokio::test]
async fn test_backfill_survives_out_of_range_elapsed_time() {
    let server = MockServer::start().await;
    let app = create_test_app(&server.uri()).await;

    let mut user = test_user(ATHLETE_ID);
    user.history_fetched = false;
    app.store.insert_user(user).await;

    mock_history(
        &server,
        1,
        json!([
            ride_json(1, &encoded_path(5), 10_000_000_000_000),
            ride_json(2, &encoded_path(5), 500),
        ]),
        1,
    )
    .await;

    let report = app.backfill.run_cycle().await;

    assert_eq!(report.users, 1);
    assert_eq!(report.persisted, 1);
    assert_eq!(report.failed, 1);
    assert!(app.store.user(ATHLETE_ID).await.unwrap().history_fetched);
}

#[tokio::test]
async fn test_failed_history_fetch_still_marks_user() {
    let server = MockServer::start().await;
    let app = create_test_app(&server.uri()).await;

    let mut user = test_user(ATHLETE_ID);
    user.history_fetched = false;
    app.store.insert_user(user).await;

    Mock::given(method("GET"))
        .and(path("/api/v3/athlete/activities"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let report = app.backfill.run_cycle().await;

    assert_eq!(report.users, 1);
    assert_eq!(report.incomplete, 1);
    assert!(app.store.contributions().await.is_empty());
    assert!(app.store.user(ATHLETE_ID).await.unwrap().history_fetched);
}

#[tokio::test]
async fn test_rate_limited_backfill_keeps_partial_history() {
    let server = MockServer::start().await;
    let app = create_test_app(&server.uri()).await;

    let mut user = test_user(ATHLETE_ID);
    user.history_fetched = false;
    app.store.insert_user(user).await;

    let full_page: Vec<Value> = (1..=50)
        .map(|id| ride_json(id, &encoded_path(3), 300))
        .collect();
    mock_history(&server, 1, Value::Array(full_page), 1).await;
    Mock::given(method("GET"))
        .and(path("/api/v3/athlete/activities"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let result = app.backfill.backfill_user(ATHLETE_ID).await.unwrap();

    assert_eq!(result.persisted, 50);
    assert_eq!(result.stop, Some(StopReason::RateLimited { page: 2 }));
    assert!(app.store.user(ATHLETE_ID).await.unwrap().history_fetched);
}

// ─── POST /user/new ─────────────────────────────────────────────────────────

fn new_user_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/user/new")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_new_user_route_backfills_immediately() {
    let server = MockServer::start().await;
    let app = create_test_app(&server.uri()).await;

    let mut user = test_user(ATHLETE_ID);
    user.history_fetched = false;
    app.store.insert_user(user).await;

    mock_history(&server, 1, json!([ride_json(1, &encoded_path(5), 500)]), 1).await;

    let response = app
        .router
        .clone()
        .oneshot(new_user_request(&format!(r#"{{"provider_user":"{ATHLETE_ID}"}}"#)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["message"], "Ok");
    assert_eq!(json["persisted"], 1);

    assert_eq!(app.store.contributions().await.len(), 1);
    assert!(app.store.user(ATHLETE_ID).await.unwrap().history_fetched);
}

#[tokio::test]
async fn test_new_user_route_unknown_user() {
    let server = MockServer::start().await;
    let app = create_test_app(&server.uri()).await;

    let response = app
        .router
        .oneshot(new_user_request(r#"{"provider_user":"999"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_new_user_route_bad_body() {
    let server = MockServer::start().await;
    let app = create_test_app(&server.uri()).await;

    for body in [r#"{"provider_user":"abc"}"#, r#"{"user":"1"}"#, "not json"] {
        let response = app
            .router
            .clone()
            .oneshot(new_user_request(body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
    }
}

#[tokio::test]
async fn test_new_user_route_other_methods_get_a_hint() {
    let server = MockServer::start().await;
    let app = create_test_app(&server.uri()).await;

    let request = Request::builder()
        .method("GET")
        .uri("/user/new")
        .body(Body::empty())
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json, json!({"message": "Use HTTP POST instead of GET"}));
}
