//! Mock Payment Processor
//!
//! For testing and local development. Behaves like Stripe (redirect) or
//! MercadoPago (inline) without any network traffic. Any payment method
//! reference containing `decline` is rejected the way a real processor would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    CaptureMode, CardSummary, CheckoutConfirmation, CustomerDetails, HostedCheckout,
    PaymentMethodRequest, PaymentProcessor, ReturnUrls, SetupSecret,
};
use crate::error::{Result, SignupError};
use crate::intent::Intent;
use crate::provider::PaymentProvider;

/// Mock processor with scripted checkout sessions
pub struct MockProcessor {
    provider: PaymentProvider,
    mode: CaptureMode,
    sessions: Mutex<HashMap<String, CheckoutConfirmation>>,
    /// Complete hosted sessions on first confirmation (dev server mode)
    auto_complete: bool,
    fail_next_confirm: AtomicBool,
    calls: AtomicUsize,
}

impl MockProcessor {
    pub fn new(provider: PaymentProvider, mode: CaptureMode) -> Self {
        Self {
            provider,
            mode,
            sessions: Mutex::new(HashMap::new()),
            auto_complete: false,
            fail_next_confirm: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Redirect-style mock standing in for Stripe
    pub fn stripe() -> Self {
        Self::new(PaymentProvider::Stripe, CaptureMode::Redirect)
    }

    /// Inline mock standing in for MercadoPago
    pub fn mercadopago() -> Self {
        Self::new(PaymentProvider::MercadoPago, CaptureMode::Inline)
    }

    /// Hosted sessions report completion as soon as they are confirmed
    #[must_use]
    pub fn auto_completing(mut self) -> Self {
        self.auto_complete = true;
        self
    }

    /// Number of processor calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Simulate the user finishing the hosted checkout
    pub async fn complete_session(&self, session_id: &str, payment_method_ref: &str) {
        self.sessions.lock().await.insert(
            session_id.to_string(),
            CheckoutConfirmation::Confirmed {
                payment_method_ref: payment_method_ref.to_string(),
            },
        );
    }

    /// Simulate the hosted checkout expiring
    pub async fn expire_session(&self, session_id: &str) {
        self.sessions
            .lock()
            .await
            .insert(session_id.to_string(), CheckoutConfirmation::Expired);
    }

    /// Make the next confirmation fail with a transport error
    pub fn fail_next_confirm(&self) {
        self.fail_next_confirm.store(true, Ordering::SeqCst);
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn check_reference(reference: &str) -> Result<()> {
        if reference.trim().is_empty() {
            return Err(SignupError::Validation(
                "Payment method reference is required".into(),
            ));
        }
        if reference.contains("decline") {
            return Err(SignupError::Provider("Your card was declined.".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentProcessor for MockProcessor {
    fn provider(&self) -> PaymentProvider {
        self.provider
    }

    fn capture_mode(&self) -> CaptureMode {
        self.mode
    }

    async fn save_payment_method(&self, request: &PaymentMethodRequest) -> Result<CardSummary> {
        self.record_call();
        Self::check_reference(&request.payment_method_ref)?;

        let chars: Vec<char> = request.payment_method_ref.chars().collect();
        let last4: String = chars[chars.len().saturating_sub(4)..].iter().collect();
        let brand = match self.provider {
            PaymentProvider::Stripe => "visa",
            PaymentProvider::MercadoPago => "master",
        };
        Ok(CardSummary {
            last4,
            brand: brand.into(),
        })
    }

    async fn create_setup(&self, customer: &CustomerDetails) -> Result<SetupSecret> {
        if self.mode != CaptureMode::Redirect {
            return Err(SignupError::Validation(format!(
                "{} does not support setup widgets",
                self.provider
            )));
        }
        self.record_call();
        tracing::debug!(email = %customer.email, "Mock setup created");
        Ok(SetupSecret {
            client_secret: format!("seti_mock_{}_secret", Uuid::new_v4().simple()),
        })
    }

    async fn create_hosted_checkout(
        &self,
        intent: &Intent,
        urls: &ReturnUrls,
    ) -> Result<HostedCheckout> {
        if self.mode != CaptureMode::Redirect {
            return Err(SignupError::Validation(format!(
                "{} does not support hosted checkout",
                self.provider
            )));
        }
        self.record_call();
        let session_id = format!("cs_mock_{}", Uuid::new_v4().simple());
        self.sessions
            .lock()
            .await
            .insert(session_id.clone(), CheckoutConfirmation::Pending);
        tracing::debug!(
            intent_id = %intent.id(),
            session_id = %session_id,
            success_url = %urls.success_url,
            "Mock hosted checkout created"
        );
        Ok(HostedCheckout {
            checkout_url: format!("https://checkout.mock.test/pay/{session_id}"),
            session_id,
        })
    }

    async fn confirm_checkout(&self, session_id: &str) -> Result<CheckoutConfirmation> {
        self.record_call();
        if self.fail_next_confirm.swap(false, Ordering::SeqCst) {
            return Err(SignupError::Network("mock processor unreachable".into()));
        }

        let mut sessions = self.sessions.lock().await;
        let Some(state) = sessions.get_mut(session_id) else {
            return Err(SignupError::Provider(format!(
                "Unknown checkout session: {session_id}"
            )));
        };
        if self.auto_complete && *state == CheckoutConfirmation::Pending {
            *state = CheckoutConfirmation::Confirmed {
                payment_method_ref: format!("pm_mock_{}", Uuid::new_v4().simple()),
            };
        }
        Ok(state.clone())
    }
}
