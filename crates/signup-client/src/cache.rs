//! Local Recovery Cache
//!
//! Holds the intent id and password across the hosted-checkout redirect so
//! the confirmation step can finalize the signup. One entry per device.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use signup_core::IntentId;
use tokio::sync::Mutex;

use crate::error::CacheError;

/// Storage key of the recovery entry
pub const RECOVERY_KEY: &str = "signup.recovery";

/// Default retention for recovery entries
pub const DEFAULT_RECOVERY_TTL_HOURS: i64 = 24;

/// Key-value storage backing the cache
#[async_trait]
pub trait RecoveryStorage: Send + Sync {
    /// `Ok(None)` when the key is absent
    async fn read(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn write(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Removing an absent key succeeds
    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// In-memory storage
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecoveryStorage for MemoryStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// One JSON file per key under a directory
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl RecoveryStorage for FileStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        match tokio::fs::read_to_string(self.path(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.path(key), value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Cached signup data needed after the redirect
#[derive(Clone, Serialize, Deserialize)]
pub struct RecoveryEntry {
    pub intent_id: IntentId,
    pub password: String,
    pub saved_at: DateTime<Utc>,
}

impl std::fmt::Debug for RecoveryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryEntry")
            .field("intent_id", &self.intent_id)
            .field("password", &"<redacted>")
            .field("saved_at", &self.saved_at)
            .finish()
    }
}

/// Typed recovery cache with a retention window
#[derive(Clone)]
pub struct RecoveryCache {
    storage: Arc<dyn RecoveryStorage>,
    ttl: Duration,
}

impl RecoveryCache {
    pub fn new(storage: Arc<dyn RecoveryStorage>, ttl: Duration) -> Self {
        Self { storage, ttl }
    }

    /// Retention from `SIGNUP_RECOVERY_TTL_HOURS`, default 24h
    pub fn from_env(storage: Arc<dyn RecoveryStorage>) -> Self {
        let hours = std::env::var("SIGNUP_RECOVERY_TTL_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|h| *h > 0)
            .unwrap_or(DEFAULT_RECOVERY_TTL_HOURS);
        let ttl = Duration::try_hours(hours)
            .unwrap_or_else(|| Duration::hours(DEFAULT_RECOVERY_TTL_HOURS));
        Self::new(storage, ttl)
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Overwrite the entry for this device
    pub async fn save(&self, intent_id: &IntentId, password: &str) -> Result<(), CacheError> {
        let entry = RecoveryEntry {
            intent_id: intent_id.clone(),
            password: password.to_string(),
            saved_at: Utc::now(),
        };
        let value = serde_json::to_string(&entry)
            .map_err(|e| CacheError::Unreadable(e.to_string()))?;
        self.storage.write(RECOVERY_KEY, &value).await?;
        tracing::debug!(intent_id = %intent_id, "Recovery entry saved");
        Ok(())
    }

    /// Load the entry; `Ok(None)` means nothing was ever cached
    ///
    /// Expired entries are removed and reported as [`CacheError::Expired`].
    pub async fn load(&self) -> Result<Option<RecoveryEntry>, CacheError> {
        let Some(raw) = self.storage.read(RECOVERY_KEY).await? else {
            return Ok(None);
        };
        let entry: RecoveryEntry =
            serde_json::from_str(&raw).map_err(|e| CacheError::Unreadable(e.to_string()))?;

        if Utc::now() - entry.saved_at > self.ttl {
            tracing::info!(intent_id = %entry.intent_id, "Recovery entry expired");
            self.storage.remove(RECOVERY_KEY).await?;
            return Err(CacheError::Expired {
                saved_at: entry.saved_at,
            });
        }
        Ok(Some(entry))
    }

    pub async fn purge(&self) -> Result<(), CacheError> {
        self.storage.remove(RECOVERY_KEY).await
    }
}
