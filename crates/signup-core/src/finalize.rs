//! Finalizer
//!
//! Turns an authorized intent into a tenant exactly once. The linked company
//! id on the intent is the idempotency marker: any call that finds it set
//! returns that company and creates nothing. Calls for the same intent are
//! serialized in-process; across processes the store's atomic link decides
//! the winner and the loser discards its tenant.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::account::{validate_password, AccountProvisioner, Company, CompanyId, NewTenant};
use crate::error::{Result, SignupError};
use crate::intent::IntentId;
use crate::store::{IntentStore, LinkOutcome};

/// Result of a finalize call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeOutcome {
    pub company: Company,
    /// False when the intent had already been finalized
    pub created: bool,
}

/// Idempotent tenant creation
pub struct Finalizer {
    store: Arc<dyn IntentStore>,
    accounts: Arc<dyn AccountProvisioner>,
    locks: StdMutex<HashMap<IntentId, Arc<Mutex<()>>>>,
}

/// Holds one intent's lock entry; the entry is dropped with the last holder
struct LockLease<'a> {
    locks: &'a StdMutex<HashMap<IntentId, Arc<Mutex<()>>>>,
    id: IntentId,
    lock: Arc<Mutex<()>>,
}

impl Drop for LockLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map and this lease hold it; nobody is waiting.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.id);
        }
    }
}

impl Finalizer {
    pub fn new(store: Arc<dyn IntentStore>, accounts: Arc<dyn AccountProvisioner>) -> Self {
        Self {
            store,
            accounts,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    fn lease(&self, id: &IntentId) -> LockLease<'_> {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.clone())
            .or_default()
            .clone();
        LockLease {
            locks: &self.locks,
            id: id.clone(),
            lock,
        }
    }

    async fn existing_company(&self, id: &IntentId, company_id: &CompanyId) -> Result<Company> {
        self.accounts.get_company(company_id).await?.ok_or_else(|| {
            SignupError::Unknown(format!(
                "intent {id} is linked to missing company {company_id}"
            ))
        })
    }

    /// Create the tenant for an intent, or return the one already created.
    ///
    /// On any failure before the link the intent is left untouched, so the
    /// call can simply be repeated. A call dropped mid-flight releases its
    /// lock entry like a completed one.
    pub async fn finalize(&self, id: &IntentId, password: &str) -> Result<FinalizeOutcome> {
        let lease = self.lease(id);
        let _guard = lease.lock.lock().await;
        self.finalize_locked(id, password).await
    }

    /// The company linked to the intent right now, if any
    async fn linked_company(&self, id: &IntentId) -> Result<Option<Company>> {
        let Some(intent) = self.store.get(id).await? else {
            return Ok(None);
        };
        match intent.linked_company_id() {
            Some(company_id) => Ok(Some(self.existing_company(id, company_id).await?)),
            None => Ok(None),
        }
    }

    async fn finalize_locked(&self, id: &IntentId, password: &str) -> Result<FinalizeOutcome> {
        let intent = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| SignupError::IntentNotFound(id.clone()))?;

        if let Some(company_id) = intent.linked_company_id() {
            tracing::info!(intent_id = %id, company_id = %company_id, "Intent already finalized");
            let company = self.existing_company(id, company_id).await?;
            return Ok(FinalizeOutcome {
                company,
                created: false,
            });
        }

        intent.ensure_finalizable()?;
        validate_password(password)?;

        let company = match self
            .accounts
            .create_tenant(NewTenant::for_intent(&intent, password))
            .await
        {
            Ok(company) => company,
            Err(e) => {
                // Another process may have finalized since the read above.
                if let Ok(Some(company)) = self.linked_company(id).await {
                    tracing::info!(
                        intent_id = %id,
                        company_id = %company.id,
                        "Intent finalized concurrently"
                    );
                    return Ok(FinalizeOutcome {
                        company,
                        created: false,
                    });
                }
                tracing::warn!(intent_id = %id, error = %e, "Tenant creation failed");
                return Err(e);
            }
        };

        match self.store.link_company(id, &company.id).await {
            Ok(LinkOutcome::Linked(_)) => {
                tracing::info!(intent_id = %id, company_id = %company.id, "Signup finalized");
                Ok(FinalizeOutcome {
                    company,
                    created: true,
                })
            }
            Ok(LinkOutcome::AlreadyLinked(winner)) if winner == company.id => {
                tracing::info!(intent_id = %id, company_id = %winner, "Intent finalized concurrently");
                Ok(FinalizeOutcome {
                    company,
                    created: false,
                })
            }
            Ok(LinkOutcome::AlreadyLinked(winner)) => {
                tracing::warn!(
                    intent_id = %id,
                    company_id = %winner,
                    "Lost finalize race, discarding duplicate tenant"
                );
                self.accounts.discard_tenant(&company.id).await?;
                let company = self.existing_company(id, &winner).await?;
                Ok(FinalizeOutcome {
                    company,
                    created: false,
                })
            }
            Err(e) => {
                self.accounts.discard_tenant(&company.id).await?;
                Err(e)
            }
        }
    }
}
