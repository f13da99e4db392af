// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook event intake.
//!
//! Drives one event through lookup, fetch and the activity pipeline.
//! Rate-limited events are handed to the spool for the sweeper to replay.

use crate::db::ContributionStore;
use crate::error::AppError;
use crate::models::WebhookEvent;
use crate::services::activity::{ActivityProcessor, PipelineStage, ProcessResult};
use crate::services::classifier::Rejection;
use crate::services::spool::SpoolQueue;
use crate::services::strava::StravaClient;
use std::sync::Arc;

/// Terminal state of one intake attempt.
#[derive(Debug)]
pub enum IntakeOutcome {
    /// Not an activity create/update; acknowledged without processing
    Ignored,
    Persisted { contribution_id: u64 },
    Rejected(Rejection),
    /// Strava answered 429 and the event was not spooled (replay path)
    RateLimited,
    /// Strava answered 429 and the event was written to the spool
    Spooled { key: String },
    Failed {
        stage: PipelineStage,
        error: AppError,
    },
}

impl IntakeOutcome {
    fn failed(stage: PipelineStage, error: AppError) -> Self {
        IntakeOutcome::Failed { stage, error }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, IntakeOutcome::Failed { .. })
    }
}

/// Entry point for inbound webhook events.
pub struct WebhookIntake {
    store: Arc<dyn ContributionStore>,
    strava: StravaClient,
    processor: Arc<ActivityProcessor>,
    spool: Arc<dyn SpoolQueue>,
}

impl WebhookIntake {
    pub fn new(
        store: Arc<dyn ContributionStore>,
        strava: StravaClient,
        processor: Arc<ActivityProcessor>,
        spool: Arc<dyn SpoolQueue>,
    ) -> Self {
        Self {
            store,
            strava,
            processor,
            spool,
        }
    }

    /// Decode a raw POST body and handle it.
    ///
    /// Returns `Err(AppError::Decoding)` for a malformed body; the event never
    /// enters the pipeline in that case.
    pub async fn handle_body(&self, body: &[u8]) -> Result<IntakeOutcome, AppError> {
        let event: WebhookEvent = serde_json::from_slice(body).map_err(|e| {
            tracing::warn!(error = %e, "Could not decode webhook body");
            AppError::Decoding(e.to_string())
        })?;

        Ok(self.handle_event(&event).await)
    }

    /// Handle a freshly received event, spooling it if rate limited.
    pub async fn handle_event(&self, event: &WebhookEvent) -> IntakeOutcome {
        tracing::info!(
            object_type = ?event.object_type,
            aspect_type = ?event.aspect_type,
            object_id = event.object_id,
            owner_id = event.owner_id,
            "Received webhook event"
        );

        match self.process_event(event).await {
            IntakeOutcome::RateLimited => match self.spool.enqueue(event).await {
                Ok(key) => IntakeOutcome::Spooled { key },
                Err(e) => {
                    tracing::error!(
                        activity_id = event.object_id,
                        athlete_id = event.owner_id,
                        error = %e,
                        "Failed to spool rate-limited event, dropping it"
                    );
                    IntakeOutcome::failed(PipelineStage::Fetched, e)
                }
            },
            outcome => outcome,
        }
    }

    /// Run the pipeline for an already decoded event.
    ///
    /// Never spools; the caller decides what to do with
    /// [`IntakeOutcome::RateLimited`].
    pub async fn process_event(&self, event: &WebhookEvent) -> IntakeOutcome {
        if !event.is_activity_change() {
            tracing::debug!(
                object_type = ?event.object_type,
                aspect_type = ?event.aspect_type,
                "Ignoring webhook event"
            );
            return IntakeOutcome::Ignored;
        }

        let athlete_id = event.owner_id;
        let activity_id = event.object_id;

        let user = match self.store.get_user_by_external_id(athlete_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::error!(athlete_id, activity_id, "Webhook for unknown athlete");
                return IntakeOutcome::failed(
                    PipelineStage::Fetched,
                    AppError::NotFound(format!("Athlete {}", athlete_id)),
                );
            }
            Err(e) => {
                tracing::error!(athlete_id, activity_id, error = %e, "User lookup failed");
                return IntakeOutcome::failed(PipelineStage::Fetched, e);
            }
        };

        let activity = match self.strava.get_activity(&user.access_token, activity_id).await {
            Ok(activity) => activity,
            Err(e) if e.is_retryable() => {
                tracing::warn!(athlete_id, activity_id, error = %e, "Rate limited fetching activity");
                return IntakeOutcome::RateLimited;
            }
            Err(e) => {
                tracing::error!(athlete_id, activity_id, error = %e, "Activity fetch failed");
                return IntakeOutcome::failed(PipelineStage::Fetched, e);
            }
        };

        match self
            .processor
            .process_activity(&user, &activity, "webhook")
            .await
        {
            Ok(ProcessResult::Persisted { contribution_id }) => {
                IntakeOutcome::Persisted { contribution_id }
            }
            Ok(ProcessResult::Rejected(rejection)) => IntakeOutcome::Rejected(rejection),
            Err(e) => {
                if e.stage == PipelineStage::Converted {
                    tracing::warn!(
                        athlete_id,
                        activity_id,
                        error = %e.source,
                        "Could not convert activity"
                    );
                } else {
                    tracing::error!(
                        athlete_id,
                        activity_id,
                        stage = %e.stage,
                        error = %e.source,
                        "Activity processing failed"
                    );
                }
                IntakeOutcome::failed(e.stage, e.source)
            }
        }
    }
}
