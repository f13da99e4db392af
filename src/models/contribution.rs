// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Contribution model: one recorded bicycle trip attributed to a user.

use chrono::{DateTime, Utc};
use geo::LineString;

/// User agent tag for contributions ingested through Strava.
pub const STRAVA_USER_AGENT: &str = "app/Strava";

/// A persisted contribution record.
///
/// Created exactly once per qualifying activity and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    /// Id allocated by the store
    pub contribution_id: u64,
    /// Internal id of the contributing user
    pub user_id: String,
    /// Source integration tag
    pub user_agent: String,
    /// Distance in meters
    pub distance: f64,
    pub time_stamp_start: DateTime<Utc>,
    pub time_stamp_stop: DateTime<Utc>,
    /// Elapsed seconds
    pub duration: i64,
    /// Recorded path (x = longitude, y = latitude)
    pub points_geom: LineString<f64>,
    /// One timestamp per point of `points_geom`
    pub points_time: Vec<DateTime<Utc>>,
}
