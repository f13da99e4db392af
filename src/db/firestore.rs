// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed [`ContributionStore`].
//!
//! Layout:
//! - `users/{external_id}`: [`User`]
//! - `contributions/{contribution_id}`: [`ContributionDocument`]
//! - `counters/contributions`: last allocated contribution id

use crate::db::{collections, ContributionStore};
use crate::error::AppError;
use crate::models::{Contribution, User};
use crate::time_utils::format_utc_rfc3339;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Document id of the contribution id counter.
const CONTRIBUTION_COUNTER: &str = "contributions";

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Connect to the emulator with a dummy bearer token.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore emulator");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client; every operation returns an error.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Create or replace a user document (used by tests and tooling).
    pub async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(user.external_id.to_string())
            .object(user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Read back a stored contribution.
    pub async fn get_contribution(
        &self,
        contribution_id: u64,
    ) -> Result<Option<ContributionDocument>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::CONTRIBUTIONS)
            .obj()
            .one(&contribution_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[async_trait]
impl ContributionStore for FirestoreDb {
    async fn get_user_by_external_id(&self, external_id: i64) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(&external_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn update_user(&self, user: &User) -> Result<(), AppError> {
        self.upsert_user(user).await
    }

    async fn get_expiring_users(&self, cutoff: DateTime<Utc>) -> Result<Vec<User>, AppError> {
        let cutoff = cutoff.timestamp();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| q.field("expires_at").less_than_or_equal(cutoff))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn fetch_users_pending_backfill(&self) -> Result<Vec<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(|q| q.field("history_fetched").eq(false))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Increments the counter document inside a transaction; Firestore
    /// retries on contention so concurrent callers never share an id.
    async fn allocate_contribution_id(&self) -> Result<u64, AppError> {
        self.get_client()?
            .run_transaction(|db, transaction| {
                Box::pin(async move {
                    let counter: Option<Counter> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::COUNTERS)
                        .obj()
                        .one(CONTRIBUTION_COUNTER)
                        .await?;

                    let next = counter.map(|c| c.value).unwrap_or(0) + 1;

                    db.fluent()
                        .update()
                        .in_col(collections::COUNTERS)
                        .document_id(CONTRIBUTION_COUNTER)
                        .object(&Counter { value: next })
                        .add_to_transaction(transaction)?;

                    Ok(next)
                })
            })
            .await
            .map_err(|e| AppError::Database(format!("Failed to allocate contribution id: {}", e)))
    }

    async fn add_contribution(
        &self,
        contribution: &Contribution,
        user: &User,
    ) -> Result<(), AppError> {
        let document = ContributionDocument::new(contribution, user);

        let _: ContributionDocument = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::CONTRIBUTIONS)
            .document_id(contribution.contribution_id.to_string())
            .object(&document)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

/// Counter document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Counter {
    value: u64,
}

/// Stored contribution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionDocument {
    pub contribution_id: u64,
    /// Internal id of the contributing user
    pub user_id: String,
    pub user_agent: String,
    /// Meters
    pub distance: f64,
    /// RFC3339
    pub time_stamp_start: String,
    /// RFC3339
    pub time_stamp_stop: String,
    /// Seconds
    pub duration: i64,
    /// GeoJSON LineString
    pub points_geom: String,
    /// RFC3339, one per point
    pub points_time: Vec<String>,
}

impl ContributionDocument {
    pub fn new(contribution: &Contribution, user: &User) -> Self {
        let geometry = geojson::Geometry::new(geojson::Value::from(&contribution.points_geom));

        Self {
            contribution_id: contribution.contribution_id,
            user_id: user.id.clone(),
            user_agent: contribution.user_agent.clone(),
            distance: contribution.distance,
            time_stamp_start: format_utc_rfc3339(contribution.time_stamp_start),
            time_stamp_stop: format_utc_rfc3339(contribution.time_stamp_stop),
            duration: contribution.duration,
            points_geom: geometry.to_string(),
            points_time: contribution
                .points_time
                .iter()
                .copied()
                .map(format_utc_rfc3339)
                .collect(),
        }
    }
}
