// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Periodic replay of spooled webhook events.

use crate::services::intake::{IntakeOutcome, WebhookIntake};
use crate::services::spool::SpoolQueue;
use std::sync::Arc;
use std::time::Duration;

/// Summary of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries picked up this cycle
    pub attempted: usize,
    /// Processed to a terminal state and removed
    pub replayed: usize,
    /// Rate limited again; left for the next cycle
    pub still_spooled: usize,
    /// Failed or unreadable; removed without being processed
    pub dropped: usize,
}

/// Drains the spool on a fixed interval.
pub struct RetrySweeper {
    intake: Arc<WebhookIntake>,
    spool: Arc<dyn SpoolQueue>,
    interval: Duration,
}

impl RetrySweeper {
    pub fn new(intake: Arc<WebhookIntake>, spool: Arc<dyn SpoolQueue>, interval: Duration) -> Self {
        Self {
            intake,
            spool,
            interval,
        }
    }

    /// Run forever, one cycle per interval tick.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }

    /// Replay every pending entry once.
    ///
    /// A bad entry is dropped and the cycle moves on to the next one.
    pub async fn run_cycle(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let keys = match self.spool.list().await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list spool");
                return report;
            }
        };

        for key in keys {
            report.attempted += 1;

            let entry = match self.spool.load(&key).await {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "Dropping unreadable spool entry");
                    self.remove(&key).await;
                    report.dropped += 1;
                    continue;
                }
            };

            match self.intake.process_event(&entry.event).await {
                IntakeOutcome::RateLimited => {
                    tracing::debug!(key = %key, "Still rate limited, keeping entry");
                    report.still_spooled += 1;
                }
                IntakeOutcome::Failed { stage, error } => {
                    tracing::error!(
                        key = %key,
                        arrived_at = %entry.arrived_at,
                        activity_id = entry.event.object_id,
                        athlete_id = entry.event.owner_id,
                        stage = %stage,
                        error = %error,
                        "Spooled event failed, dropping it"
                    );
                    self.remove(&key).await;
                    report.dropped += 1;
                }
                outcome => {
                    tracing::debug!(key = %key, outcome = ?outcome, "Spooled event replayed");
                    self.remove(&key).await;
                    report.replayed += 1;
                }
            }
        }

        tracing::info!(
            attempted = report.attempted,
            replayed = report.replayed,
            still_spooled = report.still_spooled,
            dropped = report.dropped,
            "Spool sweep finished"
        );

        report
    }

    async fn remove(&self, key: &str) {
        if let Err(e) = self.spool.remove(key).await {
            tracing::error!(key = %key, error = %e, "Failed to delete spool entry");
        }
    }
}
