//! Tenant Accounts
//!
//! The account boundary the finalizer writes to: one company plus its owning
//! user. Owner passwords are stored as Argon2id PHC hashes only.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Result, SignupError};
use crate::intent::{Intent, IntentId};

/// Minimum accepted owner password length
pub const MIN_PASSWORD_LEN: usize = 8;

/// Tenant company identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompanyId(String);

impl CompanyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CompanyId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CompanyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A provisioned tenant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub plan_id: String,
    pub modules: BTreeSet<String>,
    pub owner_user_id: String,
    pub owner_email: String,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to create a tenant for an authorized intent
pub struct NewTenant {
    /// Intent the tenant is created for
    pub intent_id: IntentId,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub company_name: String,
    pub plan_id: String,
    pub modules: BTreeSet<String>,
}

impl NewTenant {
    pub fn for_intent(intent: &Intent, password: &str) -> Self {
        let details = intent.details();
        Self {
            intent_id: intent.id().clone(),
            email: details.email.clone(),
            full_name: details.full_name.clone(),
            password: password.to_string(),
            company_name: details.company_name.clone(),
            plan_id: details.plan_id.clone(),
            modules: details.modules.clone(),
        }
    }
}

impl std::fmt::Debug for NewTenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewTenant")
            .field("intent_id", &self.intent_id)
            .field("email", &self.email)
            .field("company_name", &self.company_name)
            .field("plan_id", &self.plan_id)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Account creation boundary
#[async_trait]
pub trait AccountProvisioner: Send + Sync {
    /// Create the owning identity and the company
    ///
    /// Repeating the call for the same intent returns the company created
    /// the first time.
    async fn create_tenant(&self, tenant: NewTenant) -> Result<Company>;

    /// Look up a previously created company
    async fn get_company(&self, id: &CompanyId) -> Result<Option<Company>>;

    /// Remove a tenant that lost an idempotency race
    async fn discard_tenant(&self, id: &CompanyId) -> Result<()>;
}

/// Reject passwords the directory would not accept
pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(SignupError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| SignupError::Unknown(format!("password hashing failed: {e}")))
}

#[derive(Clone)]
struct OwnerRecord {
    intent_id: IntentId,
    company_id: CompanyId,
    password_hash: String,
}

/// In-memory account directory (for development/testing)
pub struct MemoryAccountDirectory {
    companies: RwLock<HashMap<CompanyId, Company>>,
    owners: RwLock<HashMap<String, OwnerRecord>>,
    created: AtomicUsize,
}

impl Default for MemoryAccountDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAccountDirectory {
    pub fn new() -> Self {
        Self {
            companies: RwLock::new(HashMap::new()),
            owners: RwLock::new(HashMap::new()),
            created: AtomicUsize::new(0),
        }
    }

    /// Number of tenants ever created (discarded ones included)
    pub fn tenants_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub async fn company_count(&self) -> usize {
        self.companies.read().await.len()
    }

    /// Check an owner's credentials against the stored hash
    pub async fn verify_owner(&self, email: &str, password: &str) -> Result<bool> {
        let owners = self.owners.read().await;
        let Some(owner) = owners.get(&email.to_ascii_lowercase()) else {
            return Ok(false);
        };
        let parsed = PasswordHash::new(&owner.password_hash)
            .map_err(|e| SignupError::Unknown(format!("invalid stored hash: {e}")))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}

#[async_trait]
impl AccountProvisioner for MemoryAccountDirectory {
    async fn create_tenant(&self, tenant: NewTenant) -> Result<Company> {
        validate_password(&tenant.password)?;
        let email = tenant.email.to_ascii_lowercase();
        let password_hash = hash_password(&tenant.password)?;

        let mut owners = self.owners.write().await;
        if let Some(owner) = owners.get(&email) {
            if owner.intent_id != tenant.intent_id {
                return Err(SignupError::Validation(format!(
                    "An account already exists for {email}"
                )));
            }
            let existing = self.companies.read().await.get(&owner.company_id).cloned();
            return existing.ok_or_else(|| {
                SignupError::Unknown(format!("owner {email} has no company"))
            });
        }

        let company = Company {
            id: CompanyId::new(),
            name: tenant.company_name,
            plan_id: tenant.plan_id,
            modules: tenant.modules,
            owner_user_id: Uuid::new_v4().to_string(),
            owner_email: email.clone(),
            created_at: Utc::now(),
        };
        owners.insert(
            email,
            OwnerRecord {
                intent_id: tenant.intent_id,
                company_id: company.id.clone(),
                password_hash,
            },
        );
        self.companies
            .write()
            .await
            .insert(company.id.clone(), company.clone());
        self.created.fetch_add(1, Ordering::SeqCst);

        tracing::info!(
            company_id = %company.id,
            owner = %company.owner_email,
            plan = %company.plan_id,
            "Created tenant"
        );
        Ok(company)
    }

    async fn get_company(&self, id: &CompanyId) -> Result<Option<Company>> {
        Ok(self.companies.read().await.get(id).cloned())
    }

    async fn discard_tenant(&self, id: &CompanyId) -> Result<()> {
        let mut owners = self.owners.write().await;
        if let Some(company) = self.companies.write().await.remove(id) {
            owners.retain(|_, owner| owner.company_id != company.id);
            tracing::warn!(company_id = %id, "Discarded duplicate tenant");
        }
        Ok(())
    }
}
