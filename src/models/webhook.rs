// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava push notification payload.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of object a push notification refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Activity,
    Athlete,
    /// Any object kind this daemon has no use for
    #[serde(other)]
    Unknown,
}

/// What happened to the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectType {
    Create,
    Update,
    Delete,
}

/// Strava webhook event.
///
/// Immutable once received. On rate limiting the event is written to the
/// spool verbatim, so serialization must round-trip exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub object_type: ObjectType,
    pub object_id: i64,
    pub aspect_type: AspectType,
    pub owner_id: i64,
    pub subscription_id: i64,
    #[serde(rename = "event_time")]
    pub event_time_unix: i64,
    /// Changed fields for `update` events, e.g. `{"title": "..."}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updates: Option<HashMap<String, serde_json::Value>>,
}

impl WebhookEvent {
    /// Whether this event should run the activity pipeline.
    ///
    /// Deleted activities can no longer be fetched, so only creates and
    /// updates qualify.
    pub fn is_activity_change(&self) -> bool {
        self.object_type == ObjectType::Activity
            && matches!(self.aspect_type, AspectType::Create | AspectType::Update)
    }
}
