// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod contribution;
pub mod user;
pub mod webhook;

pub use contribution::{Contribution, STRAVA_USER_AGENT};
pub use user::User;
pub use webhook::{AspectType, ObjectType, WebhookEvent};
