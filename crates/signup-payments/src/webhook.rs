//! Stripe Webhook Handling
//!
//! Optional accelerator for hosted checkout: a signed
//! `checkout.session.completed` (or `.expired`) runs the same mark-ready
//! operation the confirmation poller would call. Polling stays authoritative,
//! so a missed or duplicated delivery changes nothing.

use std::collections::HashMap;
use std::sync::Arc;

use signup_core::{IntentId, IntentStatus, SignupError, SignupService};
use stripe::{Event, EventObject, EventType, Webhook};

use crate::error::{PaymentError, Result};

/// Parsed webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// Hosted checkout finished or expired for a signup intent
    CheckoutSession {
        session_id: String,
        intent_id: Option<String>,
    },

    /// Unhandled event type
    Other { event_type: String },
}

/// What the handler did with an event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Intent re-checked against Stripe; its resulting status
    IntentUpdated {
        intent_id: IntentId,
        status: IntentStatus,
    },
    /// Nothing to do
    Ignored,
}

/// Webhook handler
pub struct StripeWebhookHandler {
    service: Arc<SignupService>,
    secret: String,
}

impl StripeWebhookHandler {
    pub fn new(service: Arc<SignupService>, secret: impl Into<String>) -> Self {
        Self {
            service,
            secret: secret.into(),
        }
    }

    /// Verify webhook signature and parse event
    pub fn parse_event(&self, payload: &str, signature: &str) -> Result<Event> {
        Webhook::construct_event(payload, signature, &self.secret)
            .map_err(|e| PaymentError::WebhookSignature(e.to_string()))
    }

    /// Process a verified webhook event
    ///
    /// Events for intents this server does not know (purged, or created by
    /// another deployment) are acknowledged and dropped.
    pub async fn handle(&self, event: &Event) -> signup_core::Result<WebhookOutcome> {
        tracing::info!(event_type = ?event.type_, "Processing Stripe webhook");

        match parse_webhook_event(event)? {
            WebhookEvent::CheckoutSession {
                session_id,
                intent_id: Some(intent_id),
            } => {
                let intent_id = IntentId::from_string(intent_id);
                let response = match self
                    .service
                    .mark_intent_ready(&intent_id, Some(&session_id))
                    .await
                {
                    Ok(response) => response,
                    Err(SignupError::IntentNotFound(id)) => {
                        tracing::warn!(intent_id = %id, "Webhook for unknown intent");
                        return Ok(WebhookOutcome::Ignored);
                    }
                    Err(e) => return Err(e),
                };
                tracing::info!(
                    intent_id = %intent_id,
                    session_id = %session_id,
                    status = %response.status,
                    "Webhook confirmed hosted checkout"
                );
                Ok(WebhookOutcome::IntentUpdated {
                    intent_id,
                    status: response.status,
                })
            }
            WebhookEvent::CheckoutSession {
                session_id,
                intent_id: None,
            } => {
                tracing::debug!(session_id = %session_id, "Checkout session without signup intent");
                Ok(WebhookOutcome::Ignored)
            }
            WebhookEvent::Other { event_type } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }
}

fn intent_id_from(
    metadata: Option<&HashMap<String, String>>,
    client_reference_id: Option<&str>,
) -> Option<String> {
    metadata
        .and_then(|m| m.get("intent_id"))
        .map(String::as_str)
        .or(client_reference_id)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Parse Stripe event into our event type
fn parse_webhook_event(event: &Event) -> Result<WebhookEvent> {
    match event.type_ {
        EventType::CheckoutSessionCompleted | EventType::CheckoutSessionExpired => {
            if let EventObject::CheckoutSession(session) = &event.data.object {
                Ok(WebhookEvent::CheckoutSession {
                    session_id: session.id.to_string(),
                    intent_id: intent_id_from(
                        session.metadata.as_ref(),
                        session.client_reference_id.as_deref(),
                    ),
                })
            } else {
                Err(PaymentError::WebhookParse("Invalid checkout session data".into()))
            }
        }
        _ => Ok(WebhookEvent::Other {
            event_type: format!("{:?}", event.type_),
        }),
    }
}
