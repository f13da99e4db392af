// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook routes for Strava events.
//!
//! Strava redelivers events that are not answered with 200, so every
//! response from these handlers is a 200 with a JSON message, whatever
//! happened internally.

use super::message;
use crate::services::IntakeOutcome;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Json, Query, State},
    http::Method,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/webhook/strava",
        get(verify).post(handle_event).fallback(wrong_method),
    )
}

/// Strava webhook verification query params.
#[derive(Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
}

/// Verification response.
#[derive(Serialize)]
struct VerifyResponse {
    #[serde(rename = "hub.challenge")]
    challenge: String,
}

/// Verify webhook subscription (GET).
async fn verify(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VerifyParams>,
) -> Response {
    let Some(challenge) = params.challenge.filter(|c| !c.is_empty()) else {
        tracing::warn!("Webhook verification without challenge");
        return message("Received values were invalid!");
    };

    if let Some(token) = params.verify_token.as_deref() {
        if token != state.config.webhook_verify_token {
            tracing::warn!(
                mode = ?params.mode,
                "Webhook verification failed: invalid token"
            );
            return message("Verify token does not match");
        }
    }

    tracing::info!(mode = ?params.mode, "Webhook subscription verified");
    Json(VerifyResponse { challenge }).into_response()
}

/// Handle incoming webhook events (POST).
async fn handle_event(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    match state.intake.handle_body(&body).await {
        Err(_) => message("Could not decode JSON body"),
        Ok(outcome) => {
            if let IntakeOutcome::Failed { stage, error } = &outcome {
                tracing::debug!(stage = %stage, error = %error, "Acknowledging failed event");
            }
            message("Ok")
        }
    }
}

async fn wrong_method(method: Method) -> Response {
    message(format!("Use HTTP POST or HTTP GET instead of {}", method))
}
