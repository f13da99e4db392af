// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store for local development and tests.

use crate::db::ContributionStore;
use crate::error::AppError;
use crate::models::{Contribution, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Store that keeps everything in memory.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<BTreeMap<i64, User>>,
    contributions: RwLock<Vec<Contribution>>,
    next_id: AtomicU64,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user (registration happens elsewhere).
    pub async fn insert_user(&self, user: User) {
        self.users.write().await.insert(user.external_id, user);
    }

    pub async fn user(&self, external_id: i64) -> Option<User> {
        self.users.read().await.get(&external_id).cloned()
    }

    /// All stored contributions, in insertion order.
    pub async fn contributions(&self) -> Vec<Contribution> {
        self.contributions.read().await.clone()
    }

    /// Make `add_contribution` fail, to exercise storage errors.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContributionStore for MemoryStore {
    async fn get_user_by_external_id(&self, external_id: i64) -> Result<Option<User>, AppError> {
        Ok(self.user(external_id).await)
    }

    async fn update_user(&self, user: &User) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        match users.get_mut(&user.external_id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("User {}", user.external_id))),
        }
    }

    async fn get_expiring_users(&self, cutoff: DateTime<Utc>) -> Result<Vec<User>, AppError> {
        let cutoff = cutoff.timestamp();
        Ok(self
            .users
            .read()
            .await
            .values()
            .filter(|u| u.expires_at <= cutoff)
            .cloned()
            .collect())
    }

    async fn fetch_users_pending_backfill(&self) -> Result<Vec<User>, AppError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .filter(|u| !u.history_fetched)
            .cloned()
            .collect())
    }

    async fn allocate_contribution_id(&self) -> Result<u64, AppError> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn add_contribution(
        &self,
        contribution: &Contribution,
        user: &User,
    ) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("writes disabled".to_string()));
        }

        let mut contributions = self.contributions.write().await;
        if contributions
            .iter()
            .any(|c| c.contribution_id == contribution.contribution_id)
        {
            return Err(AppError::Database(format!(
                "Duplicate contribution id {}",
                contribution.contribution_id
            )));
        }

        let mut stored = contribution.clone();
        stored.user_id = user.id.clone();
        contributions.push(stored);
        Ok(())
    }
}
