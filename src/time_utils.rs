// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Sortable, filesystem-safe key for an arrival instant (`20240501T080000.000000123Z`).
pub fn arrival_key(date: DateTime<Utc>) -> String {
    date.format("%Y%m%dT%H%M%S%.9fZ").to_string()
}
