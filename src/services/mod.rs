// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod activity;
pub mod classifier;
pub mod contribution;
pub mod intake;
pub mod lifecycle;
pub mod reconstruct;
pub mod spool;
pub mod strava;
pub mod sweeper;

pub use activity::{ActivityProcessor, PipelineStage, ProcessError, ProcessResult};
pub use classifier::{ActivityClassifier, Rejection};
pub use contribution::ContributionConverter;
pub use intake::{IntakeOutcome, WebhookIntake};
pub use lifecycle::{BackfillLoop, BackfillReport, RefreshReport, TokenRefresher, UserBackfill, UserLocks};
pub use spool::{FileSpool, SpoolQueue, SpooledEvent};
pub use strava::StravaClient;
pub use sweeper::{RetrySweeper, SweepReport};
