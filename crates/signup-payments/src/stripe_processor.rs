//! Stripe Processor
//!
//! Redirect-style capture. The card is collected either by an embedded
//! Stripe Elements widget backed by a SetupIntent, or on Stripe's hosted
//! checkout page in setup mode. Nothing is charged during signup; the saved
//! method is what the tenant is billed against later.

use std::collections::HashMap;

use async_trait::async_trait;
use signup_core::api::CardSummary;
use signup_core::processor::{
    CaptureMode, CheckoutConfirmation, CustomerDetails, HostedCheckout, PaymentMethodRequest,
    PaymentProcessor, ReturnUrls, SetupSecret,
};
use signup_core::{Intent, PaymentProvider};
use stripe::{
    AttachPaymentMethod, CheckoutSession, CheckoutSessionId, CheckoutSessionMode,
    CheckoutSessionStatus, Client, CreateCheckoutSession, CreateCheckoutSessionPaymentMethodTypes,
    CreateCustomer, CreateSetupIntent, Currency, Customer, CustomerId, Expandable, PaymentMethod,
    PaymentMethodId, SetupIntent, StripeError,
};

use crate::error::PaymentError;

const PROVIDER: &str = "stripe";

/// Stripe client wrapper
pub struct StripeProcessor {
    client: Client,
    webhook_secret: Option<String>,
}

impl StripeProcessor {
    /// Create a new Stripe processor
    pub fn new(secret_key: &str, webhook_secret: Option<String>) -> Self {
        Self {
            client: Client::new(secret_key),
            webhook_secret,
        }
    }

    /// Create from environment variables
    ///
    /// `STRIPE_WEBHOOK_SECRET` is optional; without it the webhook endpoint
    /// stays disabled and confirmation relies on polling alone.
    pub fn from_env() -> Result<Self, PaymentError> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.is_empty());

        Ok(Self::new(&secret_key, webhook_secret))
    }

    /// Get the webhook secret
    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref()
    }

    async fn create_customer(&self, email: &str, full_name: &str) -> Result<CustomerId, PaymentError> {
        let mut params = CreateCustomer::new();
        params.email = Some(email);
        params.name = Some(full_name);
        let customer = Customer::create(&self.client, params)
            .await
            .map_err(stripe_error)?;
        tracing::debug!(customer_id = %customer.id, "Created Stripe customer");
        Ok(customer.id)
    }
}

/// Classify a Stripe SDK error.
///
/// 4xx answers are the processor's verdict on the request and reach the user;
/// rate limits, 5xx and transport failures are transient.
fn stripe_error(err: StripeError) -> PaymentError {
    match err {
        StripeError::Stripe(req) if req.http_status == 429 || req.http_status >= 500 => {
            PaymentError::Unavailable {
                provider: PROVIDER,
                message: format!("HTTP {}", req.http_status),
            }
        }
        StripeError::Stripe(req) => PaymentError::Rejected {
            provider: PROVIDER,
            message: req
                .message
                .unwrap_or_else(|| "The payment method was declined.".into()),
        },
        e @ (StripeError::Timeout | StripeError::ClientError(_)) => PaymentError::Unavailable {
            provider: PROVIDER,
            message: e.to_string(),
        },
        other => PaymentError::UnexpectedResponse {
            provider: PROVIDER,
            message: other.to_string(),
        },
    }
}

/// Append the return parameters the confirmation page reads.
///
/// `{CHECKOUT_SESSION_ID}` is substituted by Stripe on redirect.
fn success_url_for(base: &str, intent: &Intent) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!(
        "{base}{separator}intent_id={}&session_id={{CHECKOUT_SESSION_ID}}",
        intent.id()
    )
}

fn checkout_confirmation(session: &CheckoutSession) -> Result<CheckoutConfirmation, PaymentError> {
    match session.status {
        Some(CheckoutSessionStatus::Complete) => {
            let setup_intent = match &session.setup_intent {
                Some(Expandable::Object(setup)) => setup,
                _ => {
                    return Err(PaymentError::UnexpectedResponse {
                        provider: PROVIDER,
                        message: format!("session {} has no setup intent", session.id),
                    });
                }
            };
            let payment_method = setup_intent.payment_method.as_ref().ok_or_else(|| {
                PaymentError::UnexpectedResponse {
                    provider: PROVIDER,
                    message: format!("setup intent {} has no payment method", setup_intent.id),
                }
            })?;
            Ok(CheckoutConfirmation::Confirmed {
                payment_method_ref: payment_method.id().to_string(),
            })
        }
        Some(CheckoutSessionStatus::Expired) => Ok(CheckoutConfirmation::Expired),
        _ => Ok(CheckoutConfirmation::Pending),
    }
}

#[async_trait]
impl PaymentProcessor for StripeProcessor {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Stripe
    }

    fn capture_mode(&self) -> CaptureMode {
        CaptureMode::Redirect
    }

    async fn save_payment_method(
        &self,
        request: &PaymentMethodRequest,
    ) -> signup_core::Result<CardSummary> {
        let id: PaymentMethodId = request
            .payment_method_ref
            .trim()
            .parse()
            .map_err(|_| PaymentError::InvalidReference(request.payment_method_ref.clone()))?;

        let method = PaymentMethod::retrieve(&self.client, &id, &[])
            .await
            .map_err(stripe_error)?;

        if method.customer.is_none() {
            let customer = self
                .create_customer(&request.email, &request.full_name)
                .await?;
            PaymentMethod::attach(&self.client, &id, AttachPaymentMethod { customer })
                .await
                .map_err(stripe_error)?;
        }

        let card = method.card.ok_or_else(|| PaymentError::Rejected {
            provider: PROVIDER,
            message: "Only card payment methods are accepted.".into(),
        })?;

        Ok(CardSummary {
            last4: card.last4,
            brand: card.brand,
        })
    }

    async fn create_setup(&self, customer: &CustomerDetails) -> signup_core::Result<SetupSecret> {
        let customer_id = self
            .create_customer(&customer.email, &customer.full_name)
            .await?;

        let mut params = CreateSetupIntent::new();
        params.customer = Some(customer_id);
        params.payment_method_types = Some(vec!["card".to_string()]);

        let setup = SetupIntent::create(&self.client, params)
            .await
            .map_err(stripe_error)?;

        let client_secret = setup.client_secret.ok_or_else(|| PaymentError::UnexpectedResponse {
            provider: PROVIDER,
            message: "No client secret returned".into(),
        })?;
        Ok(SetupSecret { client_secret })
    }

    async fn create_hosted_checkout(
        &self,
        intent: &Intent,
        urls: &ReturnUrls,
    ) -> signup_core::Result<HostedCheckout> {
        let success_url = success_url_for(&urls.success_url, intent);

        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Setup);
        params.currency = Some(Currency::USD);
        params.payment_method_types = Some(vec![CreateCheckoutSessionPaymentMethodTypes::Card]);
        params.customer_email = Some(&intent.details().email);
        params.client_reference_id = Some(intent.id().as_str());
        params.success_url = Some(&success_url);
        params.cancel_url = Some(&urls.cancel_url);

        let mut metadata = HashMap::new();
        metadata.insert("intent_id".to_string(), intent.id().to_string());
        metadata.insert("plan".to_string(), intent.details().plan_id.clone());
        params.metadata = Some(metadata);

        let session = CheckoutSession::create(&self.client, params)
            .await
            .map_err(stripe_error)?;

        let checkout_url = session.url.ok_or_else(|| PaymentError::UnexpectedResponse {
            provider: PROVIDER,
            message: "No checkout URL returned".into(),
        })?;

        Ok(HostedCheckout {
            session_id: session.id.to_string(),
            checkout_url,
        })
    }

    async fn confirm_checkout(&self, session_id: &str) -> signup_core::Result<CheckoutConfirmation> {
        let id: CheckoutSessionId = session_id
            .parse()
            .map_err(|_| PaymentError::InvalidReference(session_id.to_string()))?;

        let session = CheckoutSession::retrieve(&self.client, &id, &["setup_intent"])
            .await
            .map_err(stripe_error)?;

        Ok(checkout_confirmation(&session)?)
    }
}
