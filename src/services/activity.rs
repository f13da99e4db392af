// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity processing service.
//!
//! Handles the post-fetch workflow shared by webhooks and backfill:
//! 1. Classify the activity (rides with the commute workout type only)
//! 2. Reconstruct the path and its timestamp series
//! 3. Convert to a contribution with a store-allocated id
//! 4. Persist the contribution

use crate::db::ContributionStore;
use crate::error::AppError;
use crate::models::User;
use crate::services::classifier::{ActivityClassifier, Rejection};
use crate::services::contribution::ContributionConverter;
use crate::services::reconstruct::reconstruct;
use crate::services::strava::StravaActivity;
use std::fmt;
use std::sync::Arc;

/// Pipeline states an event moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    Validated,
    Fetched,
    Classified,
    Converted,
    Persisted,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Received => "received",
            PipelineStage::Validated => "validated",
            PipelineStage::Fetched => "fetched",
            PipelineStage::Classified => "classified",
            PipelineStage::Converted => "converted",
            PipelineStage::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

/// A processing failure and the stage that could not be reached.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
pub struct ProcessError {
    pub stage: PipelineStage,
    #[source]
    pub source: AppError,
}

impl ProcessError {
    fn at(stage: PipelineStage) -> impl FnOnce(AppError) -> Self {
        move |source| Self { stage, source }
    }
}

/// Result of processing a fetched activity.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessResult {
    Persisted { contribution_id: u64 },
    Rejected(Rejection),
}

/// Turns fetched activities into stored contributions.
pub struct ActivityProcessor {
    store: Arc<dyn ContributionStore>,
    classifier: ActivityClassifier,
    converter: ContributionConverter,
}

impl ActivityProcessor {
    pub fn new(
        store: Arc<dyn ContributionStore>,
        classifier: ActivityClassifier,
        converter: ContributionConverter,
    ) -> Self {
        Self {
            store,
            classifier,
            converter,
        }
    }

    /// Process one activity owned by `user`.
    ///
    /// `source` is "webhook" or "backfill" and only used for logging.
    pub async fn process_activity(
        &self,
        user: &User,
        activity: &StravaActivity,
        source: &str,
    ) -> Result<ProcessResult, ProcessError> {
        let athlete_id = user.external_id;
        let activity_id = activity.id;

        if let Err(rejection) = self.classifier.classify(activity) {
            tracing::info!(
                athlete_id,
                activity_id,
                source,
                reason = %rejection,
                "Activity rejected"
            );
            return Ok(ProcessResult::Rejected(rejection));
        }

        let path = reconstruct(
            activity.get_polyline(),
            activity.start_date_local,
            activity.elapsed_time,
        );

        let contribution = self
            .converter
            .convert(activity, user, path)
            .await
            .map_err(ProcessError::at(PipelineStage::Converted))?;

        self.store
            .add_contribution(&contribution, user)
            .await
            .map_err(ProcessError::at(PipelineStage::Persisted))?;

        tracing::info!(
            athlete_id,
            activity_id,
            source,
            contribution_id = contribution.contribution_id,
            points = contribution.points_time.len(),
            "Contribution stored"
        );

        Ok(ProcessResult::Persisted {
            contribution_id: contribution.contribution_id,
        })
    }
}
