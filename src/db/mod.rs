//! Database layer.
//!
//! [`ContributionStore`] is the only persistence interface the pipeline
//! sees; Firestore backs it in production, [`MemoryStore`] locally and in
//! tests.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::{Contribution, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const CONTRIBUTIONS: &str = "contributions";
    /// Counter documents for id allocation
    pub const COUNTERS: &str = "counters";
}

/// Persistence operations used by the ingestion pipeline.
///
/// Each call is individually atomic; no transaction spans calls.
#[async_trait]
pub trait ContributionStore: Send + Sync {
    /// Look up a user by Strava athlete id.
    async fn get_user_by_external_id(&self, external_id: i64) -> Result<Option<User>, AppError>;

    /// Overwrite a user's tokens and history flag.
    async fn update_user(&self, user: &User) -> Result<(), AppError>;

    /// Users whose access token expires at or before `cutoff`.
    async fn get_expiring_users(&self, cutoff: DateTime<Utc>) -> Result<Vec<User>, AppError>;

    /// Users whose history has not been backfilled yet.
    async fn fetch_users_pending_backfill(&self) -> Result<Vec<User>, AppError>;

    /// Reserve a unique contribution id. Ids are never reused, even if the
    /// contribution is never added.
    async fn allocate_contribution_id(&self) -> Result<u64, AppError>;

    /// Store a contribution and link it to `user`.
    async fn add_contribution(&self, contribution: &Contribution, user: &User)
        -> Result<(), AppError>;
}
