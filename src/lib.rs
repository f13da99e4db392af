// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Strava-Daemon: Turn Strava bike commutes into mobility contributions
//!
//! This crate receives Strava webhook events, fetches the referenced
//! activities and stores qualifying rides as contributions with a
//! reconstructed, timestamped path. Background loops replay rate-limited
//! events, refresh expiring tokens and import the history of new users.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use services::{BackfillLoop, WebhookIntake};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub intake: Arc<WebhookIntake>,
    pub backfill: Arc<BackfillLoop>,
}
