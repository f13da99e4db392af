// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Decides whether a Strava activity counts as a bicycle trip.

use crate::config::Config;
use crate::services::strava::StravaActivity;

/// Why an activity was not counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Activity is not a ride (e.g. "Run", "VirtualRide")
    NotARide { activity_type: String },
    /// Ride without the configured workout type
    WorkoutType { workout_type: Option<i64> },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::NotARide { activity_type } => {
                write!(f, "activity type {activity_type:?} is not a ride")
            }
            Rejection::WorkoutType { workout_type } => {
                write!(f, "workout type {workout_type:?} is not counted")
            }
        }
    }
}

/// Accepts rides carrying the configured workout type.
#[derive(Debug, Clone)]
pub struct ActivityClassifier {
    ride_type: String,
    workout_type: i64,
}

impl ActivityClassifier {
    pub fn new(ride_type: impl Into<String>, workout_type: i64) -> Self {
        Self {
            ride_type: ride_type.into(),
            workout_type,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.ride_activity_type.clone(), config.commute_workout_type)
    }

    /// `Ok(())` if the activity qualifies.
    pub fn classify(&self, activity: &StravaActivity) -> Result<(), Rejection> {
        if activity.activity_type != self.ride_type {
            return Err(Rejection::NotARide {
                activity_type: activity.activity_type.clone(),
            });
        }
        if activity.workout_type != Some(self.workout_type) {
            return Err(Rejection::WorkoutType {
                workout_type: activity.workout_type,
            });
        }
        Ok(())
    }
}
