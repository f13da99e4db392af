// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::services::reconstruct::ReconstructionError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
///
/// None of these are fatal to the process: webhook processing and the
/// background loops recover from every variant.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Could not decode payload: {0}")]
    Decoding(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Strava rate limit exceeded")]
    RateLimited,

    #[error("Strava API error: {0}")]
    StravaApi(String),

    #[error("Conversion failed: {0}")]
    Conversion(#[from] ReconstructionError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Spool error: {0}")]
    Spool(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Message prefix used for expired or revoked tokens.
    pub const STRAVA_TOKEN_ERROR: &'static str = "Token expired or invalid";

    /// Rate limiting is the only transient condition; callers spool and retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::RateLimited)
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Decoding(msg) => (StatusCode::BAD_REQUEST, "decoding_error", Some(msg.clone())),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited", None),
            AppError::StravaApi(msg) => {
                (StatusCode::BAD_GATEWAY, "strava_error", Some(msg.clone()))
            }
            AppError::Conversion(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "conversion_error",
                Some(err.to_string()),
            ),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Spool(msg) => {
                tracing::error!(error = %msg, "Spool error");
                (StatusCode::INTERNAL_SERVER_ERROR, "spool_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
