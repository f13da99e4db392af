// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava-Daemon server
//!
//! Receives Strava webhook events and runs the background loops that replay
//! spooled events, refresh tokens and backfill new users.

use std::sync::Arc;
use std::time::Duration;
use strava_daemon::{
    config::{Config, StoreBackend},
    db::{ContributionStore, FirestoreDb, MemoryStore},
    services::{
        ActivityClassifier, ActivityProcessor, BackfillLoop, ContributionConverter, FileSpool,
        RetrySweeper, SpoolQueue, StravaClient, TokenRefresher, UserLocks, WebhookIntake,
    },
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Delay before subscribing, so the handshake GET finds the server up.
const SUBSCRIBE_DELAY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, backend = ?config.store_backend, "Starting Strava-Daemon");

    let store: Arc<dyn ContributionStore> = match config.store_backend {
        StoreBackend::Firestore => Arc::new(
            FirestoreDb::new(&config.gcp_project_id)
                .await
                .expect("Failed to connect to Firestore"),
        ),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; nothing will survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let strava = StravaClient::new(&config).expect("Failed to build HTTP client");

    let spool: Arc<dyn SpoolQueue> = Arc::new(
        FileSpool::open(&config.spool_dir)
            .await
            .expect("Failed to open spool directory"),
    );
    tracing::info!(path = %config.spool_dir.display(), "Spool ready");

    let processor = Arc::new(ActivityProcessor::new(
        store.clone(),
        ActivityClassifier::from_config(&config),
        ContributionConverter::new(store.clone()),
    ));

    let intake = Arc::new(WebhookIntake::new(
        store.clone(),
        strava.clone(),
        processor.clone(),
        spool.clone(),
    ));

    // Shared by both user loops so they never write the same user at once
    let user_locks = UserLocks::new();

    let sweeper = Arc::new(RetrySweeper::new(
        intake.clone(),
        spool,
        config.retry_interval,
    ));
    let refresher = Arc::new(TokenRefresher::new(
        store.clone(),
        strava.clone(),
        user_locks.clone(),
        config.token_refresh_interval,
        config.token_refresh_lookahead,
    ));
    let backfill = Arc::new(BackfillLoop::new(
        store,
        strava.clone(),
        processor,
        user_locks,
        config.backfill_interval,
        config.backfill_page_size,
        config.backfill_max_pages,
    ));

    let loops = [
        tokio::spawn(sweeper.run()),
        tokio::spawn(refresher.run()),
        tokio::spawn(backfill.clone().run()),
    ];

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        intake,
        backfill,
    });

    // Build router
    let app = strava_daemon::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    if let Some(callback_url) = config.callback_url.clone() {
        let strava = strava.clone();
        let verify_token = config.webhook_verify_token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(SUBSCRIBE_DELAY).await;
            if let Err(e) = strava.replace_subscription(&callback_url, &verify_token).await {
                tracing::error!(error = %e, "Failed to subscribe to Strava push notifications");
            }
        });
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for handle in &loops {
        handle.abort();
    }

    if config.callback_url.is_some() {
        match strava.unsubscribe_all().await {
            Ok(count) => tracing::info!(count, "Removed push subscriptions"),
            Err(e) => tracing::error!(error = %e, "Failed to remove push subscriptions"),
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("strava_daemon=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
