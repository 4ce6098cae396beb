//! Checkout Orchestrator
//!
//! Drives an intent from `CREATED` to the point where the Finalizer may run.
//! Redirect processors get a hosted checkout page unless the method was
//! already captured by the setup widget; inline processors must arrive with a
//! token and go straight to `PAID_READY`. Free-trial intents skip payment.

use std::sync::Arc;

use crate::error::{Result, SignupError};
use crate::intent::{Intent, IntentId};
use crate::processor::{CaptureMode, CheckoutConfirmation, ProcessorRegistry, ReturnUrls};
use crate::status::IntentStatus;
use crate::store::IntentStore;

/// What the caller should do after `start_checkout`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// Send the user to the processor's hosted page
    Redirect {
        checkout_url: String,
        session_id: String,
    },
    /// Payment method already authorized; finalize directly
    PaidReady,
    /// No payment needed; finalize directly
    FreeTrial,
}

/// Checkout orchestration over the intent store and processors
pub struct CheckoutOrchestrator {
    store: Arc<dyn IntentStore>,
    processors: ProcessorRegistry,
}

impl CheckoutOrchestrator {
    pub fn new(store: Arc<dyn IntentStore>, processors: ProcessorRegistry) -> Self {
        Self { store, processors }
    }

    async fn load(&self, id: &IntentId) -> Result<Intent> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| SignupError::IntentNotFound(id.clone()))
    }

    /// Start (or resume) checkout for an intent.
    ///
    /// Safe to call again: a ready intent reports `PaidReady` and an intent
    /// already waiting on a hosted page gets the same page back.
    pub async fn start_checkout(&self, id: &IntentId, urls: &ReturnUrls) -> Result<CheckoutOutcome> {
        let mut intent = self.load(id).await?;

        if intent.is_free_trial() {
            tracing::info!(intent_id = %id, "Free-trial signup, skipping checkout");
            return Ok(CheckoutOutcome::FreeTrial);
        }

        match intent.status() {
            IntentStatus::PaidReady => return Ok(CheckoutOutcome::PaidReady),
            IntentStatus::CheckoutCreated => {
                if let (Some(url), Some(session)) =
                    (intent.checkout_url(), intent.checkout_session_id())
                {
                    return Ok(CheckoutOutcome::Redirect {
                        checkout_url: url.to_string(),
                        session_id: session.to_string(),
                    });
                }
            }
            IntentStatus::Created => {}
            other => {
                return Err(SignupError::InvalidTransition {
                    from: other,
                    to: IntentStatus::CheckoutCreated,
                });
            }
        }

        let processor = self.processors.get(intent.payment_provider())?;

        match processor.capture_mode() {
            CaptureMode::Inline => {
                if !intent.has_payment_method() {
                    return Err(SignupError::Validation(format!(
                        "A payment method token is required for {}",
                        intent.payment_provider()
                    )));
                }
                intent.advance(IntentStatus::PaidReady)?;
                self.store.save(&intent).await?;
                tracing::info!(intent_id = %id, provider = %intent.payment_provider(), "Inline payment method accepted");
                Ok(CheckoutOutcome::PaidReady)
            }
            CaptureMode::Redirect if intent.has_payment_method() => {
                // Captured by the setup widget before the intent existed.
                intent.advance(IntentStatus::CheckoutCreated)?;
                intent.advance(IntentStatus::PaidReady)?;
                self.store.save(&intent).await?;
                tracing::info!(intent_id = %id, provider = %intent.payment_provider(), "Setup payment method accepted");
                Ok(CheckoutOutcome::PaidReady)
            }
            CaptureMode::Redirect => {
                let hosted = processor.create_hosted_checkout(&intent, urls).await?;
                intent.record_checkout(hosted.session_id.clone(), hosted.checkout_url.clone());
                intent.advance(IntentStatus::CheckoutCreated)?;
                self.store.save(&intent).await?;
                tracing::info!(
                    intent_id = %id,
                    session_id = %hosted.session_id,
                    "Hosted checkout created"
                );
                Ok(CheckoutOutcome::Redirect {
                    checkout_url: hosted.checkout_url,
                    session_id: hosted.session_id,
                })
            }
        }
    }

    /// Push a `CHECKOUT_CREATED` intent to `PAID_READY` once the processor
    /// confirms the hosted checkout.
    ///
    /// Any processor failure leaves the intent exactly as it was.
    pub async fn mark_ready(&self, id: &IntentId, session_id: Option<&str>) -> Result<IntentStatus> {
        let mut intent = self.load(id).await?;

        if intent.status() != IntentStatus::CheckoutCreated {
            return Ok(intent.status());
        }

        if intent.has_payment_method() {
            intent.advance(IntentStatus::PaidReady)?;
            return self.save_confirmation(&intent).await;
        }

        let stored_session = intent.checkout_session_id().map(str::to_string);
        let session = match (session_id, stored_session.as_deref()) {
            (Some(given), Some(stored)) if given != stored => {
                return Err(SignupError::Validation(
                    "Checkout session does not belong to this signup".into(),
                ));
            }
            (Some(given), _) => given.to_string(),
            (None, Some(stored)) => stored.to_string(),
            (None, None) => return Ok(intent.status()),
        };

        let processor = self.processors.get(intent.payment_provider())?;
        match processor.confirm_checkout(&session).await? {
            CheckoutConfirmation::Confirmed { payment_method_ref } => {
                intent.attach_payment_method(&payment_method_ref)?;
                intent.advance(IntentStatus::PaidReady)?;
                tracing::info!(intent_id = %id, session_id = %session, "Hosted checkout confirmed");
            }
            CheckoutConfirmation::Pending => {
                tracing::debug!(intent_id = %id, session_id = %session, "Hosted checkout still pending");
                return Ok(intent.status());
            }
            CheckoutConfirmation::Expired => {
                intent.advance(IntentStatus::Error)?;
                tracing::warn!(intent_id = %id, session_id = %session, "Hosted checkout expired");
            }
        }

        self.save_confirmation(&intent).await
    }

    /// Persist a confirmation result. A concurrent confirmation (webhook and
    /// poller on the same session) loses only the write: the caller gets
    /// whatever the winner stored.
    async fn save_confirmation(&self, intent: &Intent) -> Result<IntentStatus> {
        match self.store.save(intent).await {
            Ok(saved) => Ok(saved.status()),
            Err(SignupError::Conflict(id)) => {
                let current = self.load(&id).await?;
                tracing::debug!(
                    intent_id = %id,
                    status = %current.status(),
                    "Concurrent confirmation, reporting stored status"
                );
                Ok(current.status())
            }
            Err(e) => Err(e),
        }
    }
}
