// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API client.
//!
//! Handles:
//! - Activity fetching (single and paginated history)
//! - Rate limit detection (429 is reported as `AppError::RateLimited`)
//! - OAuth token refresh
//! - Push subscription management

use crate::config::Config;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    api_url: String,
    oauth_url: String,
    subscription_url: String,
    client_id: String,
    client_secret: String,
}

impl StravaClient {
    /// Create a client from configuration.
    ///
    /// Every request carries `config.http_timeout`.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            api_url: config.strava_api_url.trim_end_matches('/').to_string(),
            oauth_url: config.strava_oauth_url.trim_end_matches('/').to_string(),
            subscription_url: config
                .strava_subscription_url
                .trim_end_matches('/')
                .to_string(),
            client_id: config.strava_client_id.clone(),
            client_secret: config.strava_client_secret.clone(),
        })
    }

    // ─── Activities ──────────────────────────────────────────────────────────

    /// Get a detailed activity by ID.
    pub async fn get_activity(
        &self,
        access_token: &str,
        activity_id: i64,
    ) -> Result<StravaActivity, AppError> {
        let url = format!("{}/activities/{}", self.api_url, activity_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::StravaApi(e.to_string()))?;

        check_response_json(response).await
    }

    /// List one page of the athlete's activities (pages start at 1).
    pub async fn list_activities(
        &self,
        access_token: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<StravaActivity>, AppError> {
        let url = format!("{}/athlete/activities", self.api_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("per_page", per_page.to_string()), ("page", page.to_string())])
            .send()
            .await
            .map_err(|e| AppError::StravaApi(e.to_string()))?;

        check_response_json(response).await
    }

    /// Fetch the athlete's history page by page.
    ///
    /// Stops after a short page, after `max_pages` pages, or on rate limiting.
    /// Rate limiting is a partial success reported through `ActivityPage::stop`;
    /// any other failure (including an undecodable page) fails the whole call.
    pub async fn fetch_all_pages(
        &self,
        access_token: &str,
        page_size: u32,
        max_pages: u32,
    ) -> Result<ActivityPage, AppError> {
        if page_size == 0 {
            return Err(AppError::BadRequest("page size must be positive".to_string()));
        }

        let mut activities = Vec::new();

        for page in 1..=max_pages {
            match self.list_activities(access_token, page, page_size).await {
                Ok(batch) => {
                    let count = batch.len();
                    activities.extend(batch);
                    tracing::debug!(page, count, "Fetched activity page");

                    if count < page_size as usize {
                        return Ok(ActivityPage {
                            activities,
                            stop: None,
                        });
                    }
                }
                Err(AppError::RateLimited) => {
                    tracing::warn!(
                        page,
                        fetched = activities.len(),
                        "Rate limited during pagination, returning partial history"
                    );
                    return Ok(ActivityPage {
                        activities,
                        stop: Some(StopReason::RateLimited { page }),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(ActivityPage {
            activities,
            stop: Some(StopReason::PageLimit { max_pages }),
        })
    }

    // ─── OAuth ───────────────────────────────────────────────────────────────

    /// Exchange a refresh token for a new access/refresh token pair.
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenRefreshResponse, AppError> {
        let response = self
            .http
            .post(format!("{}/token", self.oauth_url))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| AppError::StravaApi(format!("Token refresh request failed: {}", e)))?;

        let tokens: TokenRefreshResponse = check_response_json(response).await?;

        if tokens.access_token.is_empty() && tokens.refresh_token.is_empty() {
            return Err(AppError::StravaApi(
                "Token refresh returned no tokens".to_string(),
            ));
        }

        Ok(tokens)
    }

    // ─── Push subscriptions ─────────────────────────────────────────────────

    /// Register our callback URL for push notifications.
    ///
    /// Strava verifies the callback with a GET handshake before answering,
    /// so the webhook route must already be serving.
    pub async fn subscribe(
        &self,
        callback_url: &str,
        verify_token: &str,
    ) -> Result<PushSubscription, AppError> {
        let response = self
            .http
            .post(&self.subscription_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("callback_url", callback_url),
                ("verify_token", verify_token),
            ])
            .send()
            .await
            .map_err(|e| AppError::StravaApi(format!("Subscription request failed: {}", e)))?;

        check_response_json(response).await
    }

    /// List active push subscriptions for this application.
    pub async fn list_subscriptions(&self) -> Result<Vec<PushSubscription>, AppError> {
        let response = self
            .http
            .get(&self.subscription_url)
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::StravaApi(e.to_string()))?;

        check_response_json(response).await
    }

    /// Delete a push subscription.
    pub async fn unsubscribe(&self, subscription_id: i64) -> Result<(), AppError> {
        let response = self
            .http
            .delete(format!("{}/{}", self.subscription_url, subscription_id))
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::StravaApi(e.to_string()))?;

        check_response(response).await?;
        tracing::info!(subscription_id, "Unsubscribed from Strava push notifications");
        Ok(())
    }

    /// Remove every existing subscription, then subscribe `callback_url`.
    ///
    /// Strava allows a single subscription per application, so a stale one
    /// left by a previous run would make the new request fail.
    pub async fn replace_subscription(
        &self,
        callback_url: &str,
        verify_token: &str,
    ) -> Result<PushSubscription, AppError> {
        self.unsubscribe_all().await?;
        let subscription = self.subscribe(callback_url, verify_token).await?;
        tracing::info!(
            subscription_id = subscription.id,
            callback_url,
            "Subscribed to Strava push notifications"
        );
        Ok(subscription)
    }

    /// Delete all subscriptions; returns how many were removed.
    pub async fn unsubscribe_all(&self) -> Result<usize, AppError> {
        let subscriptions = self.list_subscriptions().await?;
        for subscription in &subscriptions {
            self.unsubscribe(subscription.id).await?;
        }
        Ok(subscriptions.len())
    }
}

/// Map non-success statuses to errors, keeping 429 distinct.
async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 429 {
        tracing::warn!("Strava rate limit hit (429)");
        return Err(AppError::RateLimited);
    }

    if status.as_u16() == 401 {
        return Err(AppError::StravaApi(AppError::STRAVA_TOKEN_ERROR.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    Err(AppError::StravaApi(format!("HTTP {}: {}", status, body)))
}

/// Check response and parse JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    let response = check_response(response).await?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| AppError::StravaApi(format!("Failed to read body: {}", e)))?;

    serde_json::from_slice(&bytes).map_err(|e| AppError::Decoding(e.to_string()))
}

/// Token refresh response from Strava.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    pub expires_at: i64,
}

/// Strava activity as returned by the detail and list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaActivity {
    #[serde(default)]
    pub id: i64,
    /// Meters
    pub distance: f64,
    /// Seconds
    pub moving_time: i64,
    /// Seconds
    pub elapsed_time: i64,
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(default)]
    pub workout_type: Option<i64>,
    /// Local wall-clock start (Strava labels it UTC)
    pub start_date_local: DateTime<Utc>,
    #[serde(default)]
    pub commute: bool,
    #[serde(default)]
    pub map: StravaMap,
}

impl StravaActivity {
    /// Get the detailed polyline, falling back to summary if not available.
    pub fn get_polyline(&self) -> Option<&str> {
        crate::services::reconstruct::select_polyline(
            self.map.polyline.as_deref(),
            self.map.summary_polyline.as_deref(),
        )
    }
}

/// Activity map data with polylines.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StravaMap {
    pub polyline: Option<String>,
    pub summary_polyline: Option<String>,
}

/// Result of a paginated history fetch.
#[derive(Debug, Clone)]
pub struct ActivityPage {
    pub activities: Vec<StravaActivity>,
    /// Set when fetching stopped before the end of the history.
    pub stop: Option<StopReason>,
}

impl ActivityPage {
    pub fn stopped_early(&self) -> bool {
        self.stop.is_some()
    }
}

/// Why pagination stopped before a short page was seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Strava answered 429 for this page
    RateLimited { page: u32 },
    /// Every allowed page was full
    PageLimit { max_pages: u32 },
}

/// An active push subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct PushSubscription {
    pub id: i64,
    #[serde(default)]
    pub callback_url: Option<String>,
}
