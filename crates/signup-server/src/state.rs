//! Application State

use std::sync::Arc;

use signup_core::{
    MemoryAccountDirectory, MemoryIntentStore, MockProcessor, PlanCatalog, ProcessorRegistry,
    SignupService,
};
use signup_payments::{MercadoPagoProcessor, StripeProcessor, StripeWebhookHandler};

use crate::config::{PaymentsMode, ServerConfig};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Signup pipeline operations
    pub service: Arc<SignupService>,

    /// Stripe webhook handler (optional - None if no webhook secret)
    pub stripe_webhook: Option<Arc<StripeWebhookHandler>>,
}

impl AppState {
    pub const fn new(
        service: Arc<SignupService>,
        stripe_webhook: Option<Arc<StripeWebhookHandler>>,
    ) -> Self {
        Self {
            service,
            stripe_webhook,
        }
    }

    /// Wire stores, processors and the webhook handler from configuration
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut processors = ProcessorRegistry::new();
        let mut webhook_secret = None;

        match config.payments_mode {
            PaymentsMode::Mock => {
                tracing::warn!("⚠ Using mock payment processors - no real cards are saved");
                processors.register(Arc::new(MockProcessor::stripe().auto_completing()));
                processors.register(Arc::new(MockProcessor::mercadopago()));
            }
            PaymentsMode::Live => {
                match StripeProcessor::from_env() {
                    Ok(stripe) => {
                        tracing::info!("✓ Stripe configured");
                        webhook_secret = stripe.webhook_secret().map(str::to_string);
                        processors.register(Arc::new(stripe));
                    }
                    Err(e) => {
                        tracing::warn!("⚠ Stripe not configured - non-AR signups disabled: {}", e);
                    }
                }
                match MercadoPagoProcessor::from_env() {
                    Ok(mercadopago) => {
                        tracing::info!("✓ MercadoPago configured");
                        processors.register(Arc::new(mercadopago));
                    }
                    Err(e) => {
                        tracing::warn!("⚠ MercadoPago not configured - AR signups disabled: {}", e);
                    }
                }
            }
        }

        let service = Arc::new(SignupService::new(
            Arc::new(MemoryIntentStore::new()),
            processors,
            Arc::new(MemoryAccountDirectory::new()),
            PlanCatalog::default(),
        ));

        let stripe_webhook = webhook_secret
            .map(|secret| Arc::new(StripeWebhookHandler::new(service.clone(), secret)));
        if stripe_webhook.is_none() {
            tracing::info!("Stripe webhook disabled - hosted checkouts confirm by polling");
        }

        Self::new(service, stripe_webhook)
    }
}
