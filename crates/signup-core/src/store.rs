//! Intent Store
//!
//! The server-side source of truth for intent state. Writes are optimistic on
//! [`Intent::version`]; linking a company is a single atomic check-and-set so
//! two finalizers racing across processes can never both win.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::account::CompanyId;
use crate::error::{Result, SignupError};
use crate::intent::{Intent, IntentId};

/// Result of an atomic link attempt
#[derive(Clone, Debug)]
pub enum LinkOutcome {
    /// This call linked the company; the updated intent
    Linked(Intent),
    /// Another call got there first; the company it linked
    AlreadyLinked(CompanyId),
}

/// Intent storage trait
#[async_trait]
pub trait IntentStore: Send + Sync {
    /// Insert a freshly created intent
    async fn insert(&self, intent: &Intent) -> Result<()>;

    /// Load an intent by id
    async fn get(&self, id: &IntentId) -> Result<Option<Intent>>;

    /// Persist changes, failing with `Conflict` if the intent was modified
    /// since it was read. Returns the stored copy.
    async fn save(&self, intent: &Intent) -> Result<Intent>;

    /// Count a status poll without racing other writers
    async fn record_poll(&self, id: &IntentId, restart: bool) -> Result<Intent>;

    /// Atomically link a company and mark the intent finalized
    async fn link_company(&self, id: &IntentId, company_id: &CompanyId) -> Result<LinkOutcome>;

    /// Remove intents never finalized and idle since before `cutoff`
    async fn purge_abandoned(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// In-memory intent store (for development/testing)
pub struct MemoryIntentStore {
    intents: RwLock<HashMap<IntentId, Intent>>,
}

impl Default for MemoryIntentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIntentStore {
    pub fn new() -> Self {
        Self {
            intents: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.intents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.intents.read().await.is_empty()
    }
}

#[async_trait]
impl IntentStore for MemoryIntentStore {
    async fn insert(&self, intent: &Intent) -> Result<()> {
        let mut intents = self.intents.write().await;
        if intents.contains_key(intent.id()) {
            return Err(SignupError::Storage(format!(
                "intent {} already exists",
                intent.id()
            )));
        }
        intents.insert(intent.id().clone(), intent.clone());
        Ok(())
    }

    async fn get(&self, id: &IntentId) -> Result<Option<Intent>> {
        Ok(self.intents.read().await.get(id).cloned())
    }

    async fn save(&self, intent: &Intent) -> Result<Intent> {
        let mut intents = self.intents.write().await;
        let stored = intents
            .get_mut(intent.id())
            .ok_or_else(|| SignupError::IntentNotFound(intent.id().clone()))?;

        if stored.version() != intent.version() {
            return Err(SignupError::Conflict(intent.id().clone()));
        }

        let mut updated = intent.clone();
        updated.bump_version();
        *stored = updated.clone();
        Ok(updated)
    }

    async fn record_poll(&self, id: &IntentId, restart: bool) -> Result<Intent> {
        let mut intents = self.intents.write().await;
        let stored = intents
            .get_mut(id)
            .ok_or_else(|| SignupError::IntentNotFound(id.clone()))?;
        // The poll counter is bookkeeping only and does not bump the version.
        stored.record_poll(restart);
        Ok(stored.clone())
    }

    async fn link_company(&self, id: &IntentId, company_id: &CompanyId) -> Result<LinkOutcome> {
        let mut intents = self.intents.write().await;
        let stored = intents
            .get_mut(id)
            .ok_or_else(|| SignupError::IntentNotFound(id.clone()))?;

        if let Some(existing) = stored.linked_company_id() {
            return Ok(LinkOutcome::AlreadyLinked(existing.clone()));
        }

        stored.link_company(company_id.clone())?;
        stored.bump_version();
        Ok(LinkOutcome::Linked(stored.clone()))
    }

    async fn purge_abandoned(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut intents = self.intents.write().await;
        let before = intents.len();
        intents.retain(|_, intent| !intent.is_abandoned(cutoff));
        Ok(before - intents.len())
    }
}
