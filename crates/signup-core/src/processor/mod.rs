//! Payment Processor Strategy
//!
//! A common interface for the two external processors so checkout logic works
//! with either backend. Stripe collects the method through a setup widget or a
//! hosted redirect; MercadoPago hands back a card token synchronously.
//!
//! ```text
//!   Redirect (Stripe)                  Inline (MercadoPago)
//!   create_setup ─▶ widget ─▶ pm_…     widget ─▶ card token
//!        or                                  │
//!   hosted checkout ─▶ return ─▶ confirm     ▼
//!        │                            save_payment_method
//!        ▼                                   │
//!   CHECKOUT_CREATED ─▶ PAID_READY    CREATED ─▶ PAID_READY
//! ```

mod mock;

pub use mock::MockProcessor;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SignupError};
use crate::intent::Intent;
use crate::provider::PaymentProvider;

/// How a processor captures the payment method
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Setup widget or hosted checkout page, confirmed asynchronously
    Redirect,
    /// Token captured synchronously by an embedded widget
    Inline,
}

/// Customer identity sent to the processor
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub email: String,
    pub full_name: String,
}

/// Client secret for an embedded setup widget
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetupSecret {
    pub client_secret: String,
}

/// Payment method to verify and attach to the customer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentMethodRequest {
    pub email: String,
    pub full_name: String,
    pub billing_country: String,
    pub provider: PaymentProvider,
    pub payment_method_ref: String,
}

/// Display-safe summary of a saved card
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSummary {
    pub last4: String,
    pub brand: String,
}

/// Where the processor sends the user back to
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReturnUrls {
    pub success_url: String,
    pub cancel_url: String,
}

/// A hosted checkout page created for an intent
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HostedCheckout {
    pub session_id: String,
    pub checkout_url: String,
}

/// Processor view of a hosted checkout session
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckoutConfirmation {
    /// Completed; the captured payment method
    Confirmed { payment_method_ref: String },
    /// User has not finished yet
    Pending,
    /// Session expired or was abandoned at the processor
    Expired,
}

/// Strategy trait for payment processors
///
/// Redirect-only operations default to a validation error so inline
/// processors only implement what they support.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Which provider this is
    fn provider(&self) -> PaymentProvider;

    /// How the payment method is captured
    fn capture_mode(&self) -> CaptureMode;

    /// Verify a payment method and attach it to the customer
    async fn save_payment_method(&self, request: &PaymentMethodRequest) -> Result<CardSummary>;

    /// Create a processor-side setup object for an embedded widget
    async fn create_setup(&self, _customer: &CustomerDetails) -> Result<SetupSecret> {
        Err(unsupported(self.provider(), "setup widgets"))
    }

    /// Create a hosted checkout page for an intent
    async fn create_hosted_checkout(
        &self,
        _intent: &Intent,
        _urls: &ReturnUrls,
    ) -> Result<HostedCheckout> {
        Err(unsupported(self.provider(), "hosted checkout"))
    }

    /// Ask the processor whether a hosted checkout completed
    async fn confirm_checkout(&self, _session_id: &str) -> Result<CheckoutConfirmation> {
        Err(unsupported(self.provider(), "hosted checkout"))
    }

    /// Check if the processor is reachable and configured
    async fn health_check(&self) -> bool {
        true
    }
}

fn unsupported(provider: PaymentProvider, what: &str) -> SignupError {
    SignupError::Validation(format!("{provider} does not support {what}"))
}

/// One optional processor per provider
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<PaymentProvider, Arc<dyn PaymentProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor, replacing any previous one for its provider
    pub fn register(&mut self, processor: Arc<dyn PaymentProcessor>) {
        self.processors.insert(processor.provider(), processor);
    }

    #[must_use]
    pub fn with(mut self, processor: Arc<dyn PaymentProcessor>) -> Self {
        self.register(processor);
        self
    }

    /// Processor for a provider, or a configuration error if absent
    pub fn get(&self, provider: PaymentProvider) -> Result<Arc<dyn PaymentProcessor>> {
        self.processors.get(&provider).cloned().ok_or_else(|| {
            SignupError::Config(format!("Payments via {provider} are not configured"))
        })
    }

    /// The processor that offers setup widgets
    pub fn redirect_processor(&self) -> Result<Arc<dyn PaymentProcessor>> {
        self.processors
            .values()
            .find(|p| p.capture_mode() == CaptureMode::Redirect)
            .cloned()
            .ok_or_else(|| SignupError::Config("No redirect-style processor configured".into()))
    }

    pub fn is_configured(&self, provider: PaymentProvider) -> bool {
        self.processors.contains_key(&provider)
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}
