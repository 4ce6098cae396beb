//! Signup Intents
//!
//! The durable record of one in-progress signup and its payment authorization.
//! Status changes only go through [`Intent::advance`] and
//! [`Intent::link_company`], which enforce the state machine in
//! [`crate::status`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::CompanyId;
use crate::error::{Result, SignupError};
use crate::provider::PaymentProvider;
use crate::status::{validate_transition, IntentStatus};

/// Opaque external handle for an intent
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntentId(String);

impl IntentId {
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

impl Default for IntentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IntentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the user typed into the signup wizard (never the password)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupDetails {
    pub email: String,
    pub full_name: String,
    pub company_name: String,
    pub plan_id: String,
    /// Selected add-on modules; a set, so duplicates and order are irrelevant
    #[serde(default)]
    pub modules: BTreeSet<String>,
    /// ISO 3166-1 alpha-2
    pub billing_country: String,
}

impl SignupDetails {
    /// Trim and normalize fields, then reject missing or malformed ones.
    pub fn validated(mut self) -> Result<Self> {
        self.email = self.email.trim().to_ascii_lowercase();
        self.full_name = self.full_name.trim().to_string();
        self.company_name = self.company_name.trim().to_string();
        self.plan_id = self.plan_id.trim().to_string();
        self.billing_country = self.billing_country.trim().to_ascii_uppercase();
        self.modules = self
            .modules
            .into_iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();

        let mut missing = Vec::new();
        if self.email.is_empty() {
            missing.push("email");
        }
        if self.full_name.is_empty() {
            missing.push("full_name");
        }
        if self.company_name.is_empty() {
            missing.push("company_name");
        }
        if self.plan_id.is_empty() {
            missing.push("plan_id");
        }
        if self.billing_country.is_empty() {
            missing.push("billing_country");
        }
        if !missing.is_empty() {
            return Err(SignupError::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        let well_formed_email = self
            .email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !well_formed_email {
            return Err(SignupError::Validation(format!(
                "Invalid email address: {}",
                self.email
            )));
        }

        if self.billing_country.len() != 2
            || !self.billing_country.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(SignupError::Validation(format!(
                "Invalid billing country: {}",
                self.billing_country
            )));
        }

        Ok(self)
    }
}

/// A signup intent
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Intent {
    id: IntentId,

    #[serde(flatten)]
    details: SignupDetails,

    /// Resolved once at creation, never changed
    payment_provider: PaymentProvider,

    /// Processor reference for the captured payment method
    payment_method_ref: Option<String>,

    status: IntentStatus,

    /// Status polls observed since creation or the last user retry
    attempts: u32,

    /// Plan needs no payment; checkout is skipped
    free_trial: bool,

    /// Hosted checkout session, for redirect-style processors
    checkout_session_id: Option<String>,
    checkout_url: Option<String>,

    /// Set exactly once by the finalizer; the idempotency marker
    linked_company_id: Option<CompanyId>,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    /// Optimistic concurrency token, bumped by the store on every write
    version: u64,
}

impl Intent {
    /// Create a new intent in `CREATED`
    pub fn new(
        details: SignupDetails,
        payment_provider: PaymentProvider,
        payment_method_ref: Option<String>,
        free_trial: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: IntentId::new(),
            details,
            payment_provider,
            payment_method_ref: payment_method_ref
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
            status: IntentStatus::Created,
            attempts: 0,
            free_trial,
            checkout_session_id: None,
            checkout_url: None,
            linked_company_id: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub const fn id(&self) -> &IntentId {
        &self.id
    }

    pub const fn details(&self) -> &SignupDetails {
        &self.details
    }

    pub const fn payment_provider(&self) -> PaymentProvider {
        self.payment_provider
    }

    pub fn payment_method_ref(&self) -> Option<&str> {
        self.payment_method_ref.as_deref()
    }

    pub const fn status(&self) -> IntentStatus {
        self.status
    }

    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    pub const fn is_free_trial(&self) -> bool {
        self.free_trial
    }

    pub fn checkout_session_id(&self) -> Option<&str> {
        self.checkout_session_id.as_deref()
    }

    pub fn checkout_url(&self) -> Option<&str> {
        self.checkout_url.as_deref()
    }

    pub const fn linked_company_id(&self) -> Option<&CompanyId> {
        self.linked_company_id.as_ref()
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub const fn version(&self) -> u64 {
        self.version
    }

    pub fn has_payment_method(&self) -> bool {
        self.payment_method_ref.is_some()
    }

    /// Update the activity timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Record the payment method captured by the processor.
    ///
    /// Replacing a declined method is allowed until the intent is `PAID_READY`.
    pub fn attach_payment_method(&mut self, reference: &str) -> Result<()> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(SignupError::Validation(
                "Payment method reference is required".into(),
            ));
        }
        if !matches!(
            self.status,
            IntentStatus::Created | IntentStatus::CheckoutCreated
        ) && self.payment_method_ref.as_deref() != Some(reference)
        {
            return Err(SignupError::Validation(format!(
                "Payment method cannot change once the signup is {}",
                self.status
            )));
        }
        self.payment_method_ref = Some(reference.to_string());
        self.touch();
        Ok(())
    }

    /// Remember the hosted checkout handed to the user
    pub fn record_checkout(&mut self, session_id: String, checkout_url: String) {
        self.checkout_session_id = Some(session_id);
        self.checkout_url = Some(checkout_url);
        self.touch();
    }

    /// Count a status poll; `restart` marks the first poll after a user retry
    pub fn record_poll(&mut self, restart: bool) {
        self.attempts = if restart { 1 } else { self.attempts.saturating_add(1) };
    }

    /// Move to `to`, rejecting anything the state machine does not list.
    ///
    /// `FINALIZED` is only reachable through [`Intent::link_company`].
    pub fn advance(&mut self, to: IntentStatus) -> Result<()> {
        let from = self.status;
        validate_transition(from, to)?;

        if from == to {
            return Ok(());
        }
        if to == IntentStatus::Finalized || to == IntentStatus::Timeout {
            // Timeout is a client-side signal and never persisted.
            return Err(SignupError::InvalidTransition { from, to });
        }
        if to == IntentStatus::PaidReady && !self.has_payment_method() {
            return Err(SignupError::Validation(
                "A payment method must be captured before the signup is ready".into(),
            ));
        }

        tracing::debug!(intent_id = %self.id, %from, %to, "Intent status transition");
        self.status = to;
        self.touch();
        Ok(())
    }

    /// Check the finalizer precondition without mutating anything.
    pub fn ensure_finalizable(&self) -> Result<()> {
        let ready = match self.status {
            IntentStatus::PaidReady => true,
            IntentStatus::Created => self.free_trial,
            _ => false,
        };
        if ready {
            Ok(())
        } else {
            Err(SignupError::InvalidTransition {
                from: self.status,
                to: IntentStatus::Finalized,
            })
        }
    }

    /// Bind the created company and move to `FINALIZED`.
    ///
    /// Fails if a company is already linked; callers treat that as the
    /// idempotent path and return the existing company instead.
    pub fn link_company(&mut self, company_id: CompanyId) -> Result<()> {
        if self.linked_company_id.is_some() {
            return Err(SignupError::InvalidTransition {
                from: self.status,
                to: IntentStatus::Finalized,
            });
        }
        self.ensure_finalizable()?;
        validate_transition(self.status, IntentStatus::Finalized)?;

        tracing::debug!(intent_id = %self.id, company_id = %company_id, "Linking company");
        self.linked_company_id = Some(company_id);
        self.status = IntentStatus::Finalized;
        self.touch();
        Ok(())
    }

    /// Abandoned: never finalized and idle since before `cutoff`
    pub fn is_abandoned(&self, cutoff: DateTime<Utc>) -> bool {
        self.linked_company_id.is_none() && self.updated_at < cutoff
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }
}
