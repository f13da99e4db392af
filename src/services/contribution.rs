// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Builds contribution records from qualifying activities.

use crate::db::ContributionStore;
use crate::error::AppError;
use crate::models::{Contribution, User, STRAVA_USER_AGENT};
use crate::services::reconstruct::{ReconstructedPath, ReconstructionError};
use crate::services::strava::StravaActivity;
use std::sync::Arc;

/// Maps an activity and its reconstructed path to a [`Contribution`].
#[derive(Clone)]
pub struct ContributionConverter {
    store: Arc<dyn ContributionStore>,
}

impl ContributionConverter {
    pub fn new(store: Arc<dyn ContributionStore>) -> Self {
        Self { store }
    }

    /// Convert `activity`, allocating its id from the store.
    ///
    /// A failed reconstruction fails the conversion before any id is
    /// allocated.
    pub async fn convert(
        &self,
        activity: &StravaActivity,
        user: &User,
        path: Result<ReconstructedPath, ReconstructionError>,
    ) -> Result<Contribution, AppError> {
        let path = path?;
        let contribution_id = self.store.allocate_contribution_id().await?;
        Ok(build_contribution(contribution_id, activity, user, path))
    }
}

/// Assemble the record once an id is known.
pub fn build_contribution(
    contribution_id: u64,
    activity: &StravaActivity,
    user: &User,
    path: ReconstructedPath,
) -> Contribution {
    Contribution {
        contribution_id,
        user_id: user.id.clone(),
        user_agent: STRAVA_USER_AGENT.to_string(),
        distance: activity.distance,
        time_stamp_start: path.start,
        time_stamp_stop: path.end,
        duration: activity.elapsed_time,
        points_geom: path.line,
        points_time: path.timestamps,
    }
}
