// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Durable queue for webhook events that hit the Strava rate limit.
//!
//! The intake only sees [`SpoolQueue`]; [`FileSpool`] keeps one JSON file
//! per event, named by arrival time, holding the event exactly as received.

use crate::error::AppError;
use crate::models::WebhookEvent;
use crate::time_utils::arrival_key;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::io::ErrorKind;
use std::path::PathBuf;

const ENTRY_EXTENSION: &str = "json";

/// A spooled event with its arrival time.
#[derive(Debug, Clone, PartialEq)]
pub struct SpooledEvent {
    pub key: String,
    pub arrived_at: DateTime<Utc>,
    pub event: WebhookEvent,
}

/// Durable queue of events awaiting replay.
#[async_trait]
pub trait SpoolQueue: Send + Sync {
    /// Persist `event`; returns the entry key.
    async fn enqueue(&self, event: &WebhookEvent) -> Result<String, AppError>;

    /// Keys of all pending entries, oldest first.
    async fn list(&self) -> Result<Vec<String>, AppError>;

    /// Read one entry. Fails for unreadable or undecodable entries.
    async fn load(&self, key: &str) -> Result<SpooledEvent, AppError>;

    /// Delete an entry. Deleting a missing entry is not an error.
    async fn remove(&self, key: &str) -> Result<(), AppError>;
}

/// Directory-backed spool.
#[derive(Debug, Clone)]
pub struct FileSpool {
    dir: PathBuf,
}

impl FileSpool {
    /// Open (creating if needed) the spool directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::Spool(format!("Failed to create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{ENTRY_EXTENSION}"))
    }
}

#[async_trait]
impl SpoolQueue for FileSpool {
    async fn enqueue(&self, event: &WebhookEvent) -> Result<String, AppError> {
        let body = serde_json::to_vec(event).map_err(|e| AppError::Spool(e.to_string()))?;
        let stamp = arrival_key(Utc::now());

        let mut attempt = 0u32;
        let key = loop {
            let key = if attempt == 0 {
                format!("{stamp}-{}-{}", event.owner_id, event.object_id)
            } else {
                format!("{stamp}-{}-{}-{attempt}", event.owner_id, event.object_id)
            };
            match tokio::fs::try_exists(self.entry_path(&key)).await {
                Ok(false) => break key,
                Ok(true) => attempt += 1,
                Err(e) => return Err(AppError::Spool(e.to_string())),
            }
        };

        // Write then rename so a crash never leaves a half-written entry.
        let tmp = self.dir.join(format!("{key}.tmp"));
        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| AppError::Spool(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, self.entry_path(&key))
            .await
            .map_err(|e| AppError::Spool(format!("Failed to commit {}: {}", key, e)))?;

        tracing::info!(
            key = %key,
            activity_id = event.object_id,
            athlete_id = event.owner_id,
            "Webhook event spooled"
        );
        Ok(key)
    }

    async fn list(&self) -> Result<Vec<String>, AppError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| AppError::Spool(format!("Failed to list {}: {}", self.dir.display(), e)))?;

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::Spool(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn load(&self, key: &str) -> Result<SpooledEvent, AppError> {
        let bytes = tokio::fs::read(self.entry_path(key))
            .await
            .map_err(|e| AppError::Spool(format!("Failed to read {}: {}", key, e)))?;

        let event: WebhookEvent =
            serde_json::from_slice(&bytes).map_err(|e| AppError::Decoding(e.to_string()))?;

        Ok(SpooledEvent {
            key: key.to_string(),
            arrived_at: parse_arrival(key)?,
            event,
        })
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Spool(format!("Failed to delete {}: {}", key, e))),
        }
    }
}

/// Recover the arrival instant from an entry key.
fn parse_arrival(key: &str) -> Result<DateTime<Utc>, AppError> {
    let stamp = key.split('-').next().unwrap_or_default();
    NaiveDateTime::parse_from_str(stamp, "%Y%m%dT%H%M%S%.fZ")
        .map(|naive| naive.and_utc())
        .map_err(|e| AppError::Spool(format!("Bad spool key {}: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AspectType, ObjectType};

    fn event(object_id: i64) -> WebhookEvent {
        WebhookEvent {
            object_type: ObjectType::Activity,
            object_id,
            aspect_type: AspectType::Create,
            owner_id: 134815,
            subscription_id: 120475,
            event_time_unix: 1516126040,
            updates: None,
        }
    }

    #[tokio::test]
    async fn test_enqueue_load_remove() {
        let dir = tempfile::tempdir().unwrap();
        let spool = FileSpool::open(dir.path()).await.unwrap();

        let key = spool.enqueue(&event(1)).await.unwrap();
        assert_eq!(spool.list().await.unwrap(), vec![key.clone()]);

        let entry = spool.load(&key).await.unwrap();
        assert_eq!(entry.event, event(1));
        assert!(entry.arrived_at <= Utc::now());

        spool.remove(&key).await.unwrap();
        assert!(spool.list().await.unwrap().is_empty());
        // Removing twice is fine
        spool.remove(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_entry_holds_event_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let spool = FileSpool::open(dir.path()).await.unwrap();

        let key = spool.enqueue(&event(5)).await.unwrap();
        let bytes = std::fs::read(dir.path().join(format!("{key}.json"))).unwrap();
        assert_eq!(bytes, serde_json::to_vec(&event(5)).unwrap());
    }

    #[tokio::test]
    async fn test_list_ignores_foreign_files_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let spool = FileSpool::open(dir.path()).await.unwrap();

        let first = spool.enqueue(&event(1)).await.unwrap();
        let second = spool.enqueue(&event(2)).await.unwrap();
        std::fs::write(dir.path().join("partial.tmp"), b"{").unwrap();

        let keys = spool.list().await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&first) && keys.contains(&second));
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_corrupt_entry_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let spool = FileSpool::open(dir.path()).await.unwrap();
        std::fs::write(
            dir.path().join("20240501T080000.000000000Z-1-1.json"),
            b"not json",
        )
        .unwrap();

        let result = spool.load("20240501T080000.000000000Z-1-1").await;
        assert!(matches!(result, Err(AppError::Decoding(_))));
    }

    #[test]
    fn test_parse_arrival() {
        let at = parse_arrival("20240501T080000.000000123Z-7-9").unwrap();
        assert_eq!(at.timestamp(), 1714550400);
        assert_eq!(at.timestamp_subsec_nanos(), 123);
        assert!(parse_arrival("garbage").is_err());
    }
}
