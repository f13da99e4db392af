// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User routes.

use super::message;
use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::Method,
    response::Response,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/user/new", post(new_user).fallback(wrong_method))
}

/// Request to backfill a freshly registered user.
#[derive(Deserialize)]
pub struct NewUserRequest {
    /// Strava athlete id, as a string
    pub provider_user: String,
}

#[derive(Serialize)]
pub struct NewUserResponse {
    pub message: String,
    pub persisted: usize,
    pub rejected: usize,
    pub failed: usize,
}

/// Backfill the named user's history now instead of waiting for the loop.
async fn new_user(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewUserRequest>, JsonRejection>,
) -> Result<Json<NewUserResponse>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let external_id: i64 = request.provider_user.trim().parse().map_err(|_| {
        AppError::BadRequest(format!("Invalid provider_user: {}", request.provider_user))
    })?;

    tracing::info!(athlete_id = external_id, "New user registered, backfilling");

    let result = state.backfill.backfill_user(external_id).await?;

    Ok(Json(NewUserResponse {
        message: "Ok".to_string(),
        persisted: result.persisted,
        rejected: result.rejected,
        failed: result.failed,
    }))
}

async fn wrong_method(method: Method) -> Response {
    message(format!("Use HTTP POST instead of {}", method))
}
