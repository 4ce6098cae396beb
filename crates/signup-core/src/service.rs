//! Signup Service
//!
//! The operation surface the HTTP layer exposes: one method per signup
//! operation, composed from the provider selector, checkout orchestrator,
//! intent store and finalizer.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::account::AccountProvisioner;
use crate::api::{
    CardSummary, CreateIntentRequest, CreateIntentResponse, CreateSetupRequest,
    CreateSetupResponse, FinalizeResponse, IntentStatusResponse, SavePaymentMethodRequest,
    StartCheckoutResponse,
};
use crate::checkout::CheckoutOrchestrator;
use crate::error::{Result, SignupError};
use crate::finalize::Finalizer;
use crate::intent::{Intent, IntentId};
use crate::plan::PlanCatalog;
use crate::processor::{CustomerDetails, ProcessorRegistry, ReturnUrls};
use crate::provider::select_provider;
use crate::store::IntentStore;

/// Signup pipeline operations
pub struct SignupService {
    store: Arc<dyn IntentStore>,
    processors: ProcessorRegistry,
    plans: PlanCatalog,
    checkout: CheckoutOrchestrator,
    finalizer: Finalizer,
}

impl SignupService {
    pub fn new(
        store: Arc<dyn IntentStore>,
        processors: ProcessorRegistry,
        accounts: Arc<dyn AccountProvisioner>,
        plans: PlanCatalog,
    ) -> Self {
        Self {
            checkout: CheckoutOrchestrator::new(store.clone(), processors.clone()),
            finalizer: Finalizer::new(store.clone(), accounts),
            store,
            processors,
            plans,
        }
    }

    pub const fn processors(&self) -> &ProcessorRegistry {
        &self.processors
    }

    pub const fn plans(&self) -> &PlanCatalog {
        &self.plans
    }

    /// Create a setup object for the redirect-style processor's widget
    pub async fn create_setup(&self, req: CreateSetupRequest) -> Result<CreateSetupResponse> {
        let customer = CustomerDetails {
            email: req.email.trim().to_ascii_lowercase(),
            full_name: req.full_name.trim().to_string(),
        };
        if customer.email.is_empty() || customer.full_name.is_empty() {
            return Err(SignupError::Validation(
                "Missing required fields: email, full_name".into(),
            ));
        }

        let processor = self.processors.redirect_processor()?;
        let setup = processor.create_setup(&customer).await?;
        tracing::info!(provider = %processor.provider(), "Setup created");
        Ok(CreateSetupResponse {
            client_secret: setup.client_secret,
        })
    }

    /// Verify a captured payment method with the processor for its country
    pub async fn save_payment_method(&self, req: &SavePaymentMethodRequest) -> Result<CardSummary> {
        let expected = select_provider(&req.billing_country);
        if req.provider != expected {
            return Err(SignupError::Validation(format!(
                "Billing country {} is served by {expected}, not {}",
                req.billing_country.trim(),
                req.provider
            )));
        }

        let processor = self.processors.get(expected)?;
        let card = processor.save_payment_method(req).await?;
        tracing::info!(provider = %expected, brand = %card.brand, last4 = %card.last4, "Payment method saved");
        Ok(card)
    }

    /// Validate signup input and record a new intent in `CREATED`
    pub async fn create_intent(&self, req: CreateIntentRequest) -> Result<CreateIntentResponse> {
        let details = req.details().validated()?;
        let plan = self.plans.get(&details.plan_id)?;
        let provider = select_provider(&details.billing_country);

        if let Some(requested) = req.provider.filter(|p| *p != provider) {
            return Err(SignupError::Validation(format!(
                "Billing country {} is served by {provider}, not {requested}",
                details.billing_country
            )));
        }

        let free_trial = !plan.requires_payment();
        if !free_trial {
            // Fail before the intent exists rather than at checkout.
            self.processors.get(provider)?;
        }

        let intent = Intent::new(details, provider, req.payment_method_ref, free_trial);
        self.store.insert(&intent).await?;
        tracing::info!(
            intent_id = %intent.id(),
            provider = %provider,
            plan = %intent.details().plan_id,
            free_trial,
            "Signup intent created"
        );

        Ok(CreateIntentResponse {
            intent_id: intent.id().clone(),
            payment_provider: provider,
            status: intent.status(),
        })
    }

    pub async fn start_checkout(
        &self,
        id: &IntentId,
        urls: &ReturnUrls,
    ) -> Result<StartCheckoutResponse> {
        self.checkout.start_checkout(id, urls).await.map(Into::into)
    }

    /// Current server-side status; each call counts as one poll
    pub async fn get_intent_status(
        &self,
        id: &IntentId,
        restart: bool,
    ) -> Result<IntentStatusResponse> {
        let intent = self.store.record_poll(id, restart).await?;
        Ok(IntentStatusResponse {
            intent_id: id.clone(),
            status: intent.status(),
            attempts: intent.attempts(),
        })
    }

    pub async fn mark_intent_ready(
        &self,
        id: &IntentId,
        external_session_id: Option<&str>,
    ) -> Result<IntentStatusResponse> {
        let status = self.checkout.mark_ready(id, external_session_id).await?;
        let attempts = self
            .store
            .get(id)
            .await?
            .map_or(0, |intent| intent.attempts());
        Ok(IntentStatusResponse {
            intent_id: id.clone(),
            status,
            attempts,
        })
    }

    pub async fn finalize_signup(&self, id: &IntentId, password: &str) -> Result<FinalizeResponse> {
        let outcome = self.finalizer.finalize(id, password).await?;
        Ok(FinalizeResponse {
            company: outcome.company,
            created: outcome.created,
        })
    }

    /// Drop intents idle for longer than `ttl` that never finalized
    pub async fn purge_abandoned(&self, ttl: Duration) -> Result<usize> {
        let purged = self.store.purge_abandoned(Utc::now() - ttl).await?;
        if purged > 0 {
            tracing::info!(purged, ttl_hours = ttl.num_hours(), "Purged abandoned intents");
        }
        Ok(purged)
    }
}
