// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Background loops that maintain users: token refresh and history backfill.
//!
//! Both loops write the same user documents, so every read-modify-write of a
//! user happens under that user's [`UserLocks`] entry and starts by
//! re-reading the stored user.

use crate::db::ContributionStore;
use crate::error::AppError;
use crate::models::User;
use crate::services::activity::{ActivityProcessor, ProcessResult};
use crate::services::strava::{StopReason, StravaClient};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-user mutex serializing user updates.
#[derive(Clone, Default)]
pub struct UserLocks {
    locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `external_id`.
    pub async fn lock(&self, external_id: i64) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(external_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        lock.lock_owned().await
    }
}

// ─── Token refresh ──────────────────────────────────────────────────────────

/// Summary of one refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Users found expiring within the lookahead
    pub checked: usize,
    pub refreshed: usize,
    pub failed: usize,
}

/// Renews access tokens before they expire.
pub struct TokenRefresher {
    store: Arc<dyn ContributionStore>,
    strava: StravaClient,
    locks: UserLocks,
    interval: Duration,
    lookahead: Duration,
}

impl TokenRefresher {
    pub fn new(
        store: Arc<dyn ContributionStore>,
        strava: StravaClient,
        locks: UserLocks,
        interval: Duration,
        lookahead: Duration,
    ) -> Self {
        Self {
            store,
            strava,
            locks,
            interval,
            lookahead,
        }
    }

    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }

    /// Refresh every user whose token expires within the lookahead window.
    pub async fn run_cycle(&self) -> RefreshReport {
        let mut report = RefreshReport::default();
        let lookahead = chrono::Duration::from_std(self.lookahead)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = Utc::now() + lookahead;

        let users = match self.store.get_expiring_users(cutoff).await {
            Ok(users) => users,
            Err(e) => {
                tracing::error!(error = %e, "Failed to query expiring users");
                return report;
            }
        };

        for user in users {
            report.checked += 1;
            match self.refresh_user(user.external_id, cutoff.timestamp()).await {
                Ok(()) => report.refreshed += 1,
                Err(e) => {
                    tracing::error!(
                        athlete_id = user.external_id,
                        error = %e,
                        "Token refresh failed"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            checked = report.checked,
            refreshed = report.refreshed,
            failed = report.failed,
            "Token refresh cycle finished"
        );

        report
    }

    async fn refresh_user(&self, external_id: i64, cutoff: i64) -> Result<(), AppError> {
        let _guard = self.locks.lock(external_id).await;

        let mut user = self
            .store
            .get_user_by_external_id(external_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Athlete {}", external_id)))?;

        // Refreshed by someone else while we waited
        if user.expires_at > cutoff {
            tracing::debug!(athlete_id = external_id, "Token already fresh");
            return Ok(());
        }

        let tokens = self.strava.refresh_token(&user.refresh_token).await?;

        if !tokens.access_token.is_empty() {
            user.access_token = tokens.access_token;
        }
        if !tokens.refresh_token.is_empty() {
            user.refresh_token = tokens.refresh_token;
        }
        user.expires_at = tokens.expires_at;

        self.store.update_user(&user).await?;

        tracing::info!(
            athlete_id = external_id,
            expires_at = %user.expires_at_utc(),
            "Access token refreshed"
        );
        Ok(())
    }
}

// ─── History backfill ───────────────────────────────────────────────────────

/// Outcome of backfilling one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserBackfill {
    pub external_id: i64,
    /// Activities returned by the history fetch
    pub fetched: usize,
    pub persisted: usize,
    pub rejected: usize,
    pub failed: usize,
    /// Why the history fetch stopped early, if it did
    pub stop: Option<StopReason>,
    /// The history fetch itself failed
    pub fetch_failed: bool,
}

/// Summary of one backfill cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub users: usize,
    pub persisted: usize,
    pub rejected: usize,
    pub failed: usize,
    /// Users whose history was only partly (or not) fetched
    pub incomplete: usize,
    /// Users whose history flag could not be written
    pub errors: usize,
}

/// Imports the existing history of newly registered users.
///
/// A user is marked as backfilled after one attempt even when the fetch
/// stopped early or some activities failed; partial history is not retried.
pub struct BackfillLoop {
    store: Arc<dyn ContributionStore>,
    strava: StravaClient,
    processor: Arc<ActivityProcessor>,
    locks: UserLocks,
    interval: Duration,
    page_size: u32,
    max_pages: u32,
}

impl BackfillLoop {
    pub fn new(
        store: Arc<dyn ContributionStore>,
        strava: StravaClient,
        processor: Arc<ActivityProcessor>,
        locks: UserLocks,
        interval: Duration,
        page_size: u32,
        max_pages: u32,
    ) -> Self {
        Self {
            store,
            strava,
            processor,
            locks,
            interval,
            page_size,
            max_pages,
        }
    }

    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }

    /// Backfill every user whose history has not been fetched.
    pub async fn run_cycle(&self) -> BackfillReport {
        let mut report = BackfillReport::default();

        let users = match self.store.fetch_users_pending_backfill().await {
            Ok(users) => users,
            Err(e) => {
                tracing::error!(error = %e, "Failed to query users pending backfill");
                return report;
            }
        };

        for user in users {
            report.users += 1;
            match self.backfill(&user).await {
                Ok(result) => {
                    report.persisted += result.persisted;
                    report.rejected += result.rejected;
                    report.failed += result.failed;
                    if result.fetch_failed || result.stop.is_some() {
                        report.incomplete += 1;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        athlete_id = user.external_id,
                        error = %e,
                        "Failed to mark history as fetched"
                    );
                    report.errors += 1;
                }
            }
        }

        tracing::info!(
            users = report.users,
            persisted = report.persisted,
            rejected = report.rejected,
            failed = report.failed,
            incomplete = report.incomplete,
            "Backfill cycle finished"
        );

        report
    }

    /// Backfill one user right away, by Strava athlete id.
    pub async fn backfill_user(&self, external_id: i64) -> Result<UserBackfill, AppError> {
        let user = self
            .store
            .get_user_by_external_id(external_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Athlete {}", external_id)))?;

        self.backfill(&user).await
    }

    async fn backfill(&self, user: &User) -> Result<UserBackfill, AppError> {
        let athlete_id = user.external_id;
        let mut result = UserBackfill {
            external_id: athlete_id,
            ..Default::default()
        };

        tracing::info!(athlete_id, "Starting history backfill");

        match self
            .strava
            .fetch_all_pages(&user.access_token, self.page_size, self.max_pages)
            .await
        {
            Ok(page) => {
                result.fetched = page.activities.len();
                result.stop = page.stop;

                for activity in &page.activities {
                    match self
                        .processor
                        .process_activity(user, activity, "backfill")
                        .await
                    {
                        Ok(ProcessResult::Persisted { .. }) => result.persisted += 1,
                        Ok(ProcessResult::Rejected(_)) => result.rejected += 1,
                        Err(e) => {
                            tracing::warn!(
                                athlete_id,
                                activity_id = activity.id,
                                error = %e,
                                "Skipping activity during backfill"
                            );
                            result.failed += 1;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!(athlete_id, error = %e, "History fetch failed");
                result.fetch_failed = true;
            }
        }

        self.mark_history_fetched(athlete_id).await?;

        tracing::info!(
            athlete_id,
            fetched = result.fetched,
            persisted = result.persisted,
            rejected = result.rejected,
            failed = result.failed,
            stop = ?result.stop,
            "History backfill finished"
        );

        Ok(result)
    }

    async fn mark_history_fetched(&self, external_id: i64) -> Result<(), AppError> {
        let _guard = self.locks.lock(external_id).await;

        let mut user = self
            .store
            .get_user_by_external_id(external_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Athlete {}", external_id)))?;

        user.history_fetched = true;
        self.store.update_user(&user).await
    }
}
