// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use serde_json::{json, Value};
use std::sync::Arc;
use strava_daemon::config::Config;
use strava_daemon::db::{ContributionStore, FirestoreDb, MemoryStore};
use strava_daemon::models::User;
use strava_daemon::routes::create_router;
use strava_daemon::services::{
    ActivityClassifier, ActivityProcessor, BackfillLoop, ContributionConverter, FileSpool,
    RetrySweeper, SpoolQueue, StravaClient, TokenRefresher, UserLocks, WebhookIntake,
};
use strava_daemon::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Athlete id used by the fixtures.
#[allow(dead_code)]
pub const ATHLETE_ID: i64 = 134815;

/// Everything a test needs to drive the daemon offline.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub spool: Arc<FileSpool>,
    pub sweeper: RetrySweeper,
    pub refresher: TokenRefresher,
    pub backfill: Arc<BackfillLoop>,
    pub strava: StravaClient,
    spool_dir: tempfile::TempDir,
}

impl TestApp {
    #[allow(dead_code)]
    pub fn spool_path(&self) -> &std::path::Path {
        self.spool_dir.path()
    }
}

/// Config whose Strava endpoints all point at `server_uri` (a wiremock server).
#[allow(dead_code)]
pub fn test_config(server_uri: &str) -> Config {
    let mut config = Config::test_default();
    config.strava_api_url = format!("{server_uri}/api/v3");
    config.strava_oauth_url = format!("{server_uri}/oauth");
    config.strava_subscription_url = format!("{server_uri}/api/v3/push_subscriptions");
    config
}

/// Build the full app on a memory store and a temporary spool.
#[allow(dead_code)]
pub async fn create_test_app(server_uri: &str) -> TestApp {
    let config = test_config(server_uri);
    let spool_dir = tempfile::tempdir().expect("Failed to create spool dir");

    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn ContributionStore> = store.clone();
    let spool = Arc::new(
        FileSpool::open(spool_dir.path())
            .await
            .expect("Failed to open spool"),
    );
    let dyn_spool: Arc<dyn SpoolQueue> = spool.clone();
    let strava = StravaClient::new(&config).expect("Failed to build client");

    let processor = Arc::new(ActivityProcessor::new(
        dyn_store.clone(),
        ActivityClassifier::from_config(&config),
        ContributionConverter::new(dyn_store.clone()),
    ));
    let intake = Arc::new(WebhookIntake::new(
        dyn_store.clone(),
        strava.clone(),
        processor.clone(),
        dyn_spool.clone(),
    ));
    let locks = UserLocks::new();

    let sweeper = RetrySweeper::new(intake.clone(), dyn_spool, config.retry_interval);
    let refresher = TokenRefresher::new(
        dyn_store.clone(),
        strava.clone(),
        locks.clone(),
        config.token_refresh_interval,
        config.token_refresh_lookahead,
    );
    let backfill = Arc::new(BackfillLoop::new(
        dyn_store,
        strava.clone(),
        processor,
        locks,
        config.backfill_interval,
        config.backfill_page_size,
        config.backfill_max_pages,
    ));

    let state = Arc::new(AppState {
        config,
        intake,
        backfill: backfill.clone(),
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        spool,
        sweeper,
        refresher,
        backfill,
        strava,
        spool_dir,
    }
}

/// A registered user with valid-looking tokens.
#[allow(dead_code)]
pub fn test_user(external_id: i64) -> User {
    User {
        id: format!("user-{external_id}"),
        external_id,
        access_token: format!("access-{external_id}"),
        refresh_token: format!("refresh-{external_id}"),
        expires_at: chrono::Utc::now().timestamp() + 6 * 3600,
        history_fetched: true,
    }
}

/// Encoded polyline with `points` distinct coordinates.
#[allow(dead_code)]
pub fn encoded_path(points: usize) -> String {
    let coords = (0..points).map(|i| geo::Coord {
        x: 4.35 + i as f64 * 0.001,
        y: 50.85 + i as f64 * 0.0005,
    });
    polyline::encode_coordinates(coords, 5).expect("Failed to encode polyline")
}

/// Strava activity JSON for a commute ride.
#[allow(dead_code)]
pub fn ride_json(id: i64, polyline: &str, elapsed_time: i64) -> Value {
    json!({
        "id": id,
        "name": "Morning Commute",
        "distance": 4321.0,
        "moving_time": elapsed_time - 60,
        "elapsed_time": elapsed_time,
        "type": "Ride",
        "workout_type": 10,
        "start_date_local": "2024-05-01T08:00:00Z",
        "commute": true,
        "map": {
            "id": format!("a{id}"),
            "polyline": polyline,
            "summary_polyline": polyline
        }
    })
}

/// Webhook body for an activity event.
#[allow(dead_code)]
pub fn activity_event_json(activity_id: i64, owner_id: i64, aspect_type: &str) -> Value {
    json!({
        "aspect_type": aspect_type,
        "event_time": 1516126040,
        "object_id": activity_id,
        "object_type": "activity",
        "owner_id": owner_id,
        "subscription_id": 120475,
        "updates": {}
    })
}
