// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Path reconstruction from Strava encoded polylines.
//!
//! Strava only ships the geometry of an activity, not per-point times, so a
//! timestamp series is synthesized by spreading the elapsed time evenly over
//! the decoded points.

use chrono::{DateTime, Duration, Utc};
use geo::LineString;

/// Strava polylines use precision 5.
const POLYLINE_PRECISION: u32 = 5;

/// Decoded path with one synthesized timestamp per coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedPath {
    /// Coordinates in recording order (x = longitude, y = latitude)
    pub line: LineString<f64>,
    pub timestamps: Vec<DateTime<Utc>>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReconstructedPath {
    /// Number of points in the path.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Pick the encoded polyline to decode: the detailed one, else the summary.
///
/// Empty strings count as missing.
pub fn select_polyline<'a>(primary: Option<&'a str>, summary: Option<&'a str>) -> Option<&'a str> {
    primary
        .filter(|p| !p.is_empty())
        .or(summary.filter(|s| !s.is_empty()))
}

/// Decode `encoded` and synthesize timestamps starting at `start`.
///
/// Point `i` is stamped `start + i * (elapsed_secs / n)` using integer
/// division; the path ends at `start + elapsed_secs`.
pub fn reconstruct(
    encoded: Option<&str>,
    start: DateTime<Utc>,
    elapsed_secs: i64,
) -> Result<ReconstructedPath, ReconstructionError> {
    if elapsed_secs < 0 {
        return Err(ReconstructionError::NegativeDuration(elapsed_secs));
    }

    let line = match encoded {
        Some(encoded) if !encoded.is_empty() => {
            polyline::decode_polyline(encoded, POLYLINE_PRECISION)
                .map_err(|e| ReconstructionError::InvalidPolyline(e.to_string()))?
        }
        _ => return Err(ReconstructionError::EmptyGeometry),
    };

    let timestamps = timestamp_series(start, elapsed_secs, line.0.len())?;
    let end = offset(start, elapsed_secs)?;

    Ok(ReconstructedPath {
        line,
        timestamps,
        start,
        end,
    })
}

/// Evenly spaced timestamps for `point_count` points.
pub fn timestamp_series(
    start: DateTime<Utc>,
    elapsed_secs: i64,
    point_count: usize,
) -> Result<Vec<DateTime<Utc>>, ReconstructionError> {
    if point_count == 0 {
        return Err(ReconstructionError::EmptyGeometry);
    }

    let interval = elapsed_secs / point_count as i64;
    (0..point_count as i64)
        .map(|i| {
            let secs = i
                .checked_mul(interval)
                .ok_or(ReconstructionError::TimeOutOfRange(elapsed_secs))?;
            offset(start, secs)
        })
        .collect()
}

fn offset(start: DateTime<Utc>, secs: i64) -> Result<DateTime<Utc>, ReconstructionError> {
    Duration::try_seconds(secs)
        .and_then(|delta| start.checked_add_signed(delta))
        .ok_or(ReconstructionError::TimeOutOfRange(secs))
}

/// Errors from path reconstruction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReconstructionError {
    #[error("Activity has no geometry")]
    EmptyGeometry,

    #[error("Failed to decode polyline: {0}")]
    InvalidPolyline(String),

    #[error("Elapsed time must not be negative (got {0}s)")]
    NegativeDuration(i64),

    #[error("Timestamp out of range ({0}s after start)")]
    TimeOutOfRange(i64),
}
