//! User model shared with the registration service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered Strava user.
///
/// Users are created by the registration flow; this daemon only reads them
/// and writes back refreshed tokens and the history flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Internal user reference (attached to contributions)
    pub id: String,
    /// Strava athlete ID (also used as document ID)
    pub external_id: i64,
    /// OAuth access token
    pub access_token: String,
    /// OAuth refresh token
    pub refresh_token: String,
    /// Access token expiry (Unix seconds)
    pub expires_at: i64,
    /// Whether historical activities have been backfilled
    #[serde(default)]
    pub history_fetched: bool,
}

impl User {
    /// Access token expiry as a UTC timestamp.
    pub fn expires_at_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.expires_at, 0).unwrap_or_default()
    }
}
