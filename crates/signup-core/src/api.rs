//! Wire types for the signup operations, shared by server and client.

use serde::{Deserialize, Serialize};

use crate::account::Company;
use crate::checkout::CheckoutOutcome;
use crate::intent::{IntentId, SignupDetails};
use crate::processor::ReturnUrls;
use crate::provider::PaymentProvider;
use crate::status::IntentStatus;

pub use crate::processor::{CardSummary, PaymentMethodRequest as SavePaymentMethodRequest};

/// `create-setup` request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateSetupRequest {
    pub email: String,
    pub full_name: String,
}

/// `create-setup` response
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateSetupResponse {
    pub client_secret: String,
}

/// `create-intent` request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateIntentRequest {
    pub email: String,
    pub full_name: String,
    pub company_name: String,
    pub plan_id: String,
    #[serde(default)]
    pub modules: Vec<String>,
    /// Checked against the provider derived from `billing_country`
    #[serde(default)]
    pub provider: Option<PaymentProvider>,
    #[serde(default)]
    pub payment_method_ref: Option<String>,
    pub billing_country: String,
}

impl CreateIntentRequest {
    pub fn details(&self) -> SignupDetails {
        SignupDetails {
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            company_name: self.company_name.clone(),
            plan_id: self.plan_id.clone(),
            modules: self.modules.iter().cloned().collect(),
            billing_country: self.billing_country.clone(),
        }
    }
}

/// `create-intent` response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIntentResponse {
    pub intent_id: IntentId,
    pub payment_provider: PaymentProvider,
    pub status: IntentStatus,
}

/// `start-checkout` request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StartCheckoutRequest {
    pub success_url: String,
    pub cancel_url: String,
}

impl From<StartCheckoutRequest> for ReturnUrls {
    fn from(req: StartCheckoutRequest) -> Self {
        Self {
            success_url: req.success_url,
            cancel_url: req.cancel_url,
        }
    }
}

/// `start-checkout` response: at most one of the three outcomes is set
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartCheckoutResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub is_paid_ready: bool,
    #[serde(default)]
    pub is_free_trial: bool,
}

impl From<CheckoutOutcome> for StartCheckoutResponse {
    fn from(outcome: CheckoutOutcome) -> Self {
        match outcome {
            CheckoutOutcome::Redirect {
                checkout_url,
                session_id,
            } => Self {
                checkout_url: Some(checkout_url),
                session_id: Some(session_id),
                ..Self::default()
            },
            CheckoutOutcome::PaidReady => Self {
                is_paid_ready: true,
                ..Self::default()
            },
            CheckoutOutcome::FreeTrial => Self {
                is_free_trial: true,
                ..Self::default()
            },
        }
    }
}

/// `get-intent-status` query
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatusQuery {
    /// First poll after a user retry; restarts the server-side counter
    #[serde(default)]
    pub restart: bool,
}

/// `get-intent-status` / `mark-intent-ready` response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentStatusResponse {
    pub intent_id: IntentId,
    pub status: IntentStatus,
    #[serde(default)]
    pub attempts: u32,
}

/// `mark-intent-ready` request
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MarkReadyRequest {
    #[serde(default)]
    pub external_session_id: Option<String>,
}

/// `finalize-signup` request
#[derive(Clone, Serialize, Deserialize)]
pub struct FinalizeRequest {
    pub password: String,
}

impl std::fmt::Debug for FinalizeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinalizeRequest")
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `finalize-signup` response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeResponse {
    pub company: Company,
    /// False when an earlier call had already created the company
    pub created: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_response_shapes() {
        let json = serde_json::to_value(StartCheckoutResponse::from(CheckoutOutcome::FreeTrial))
            .unwrap();
        assert_eq!(json["is_free_trial"], true);
        assert_eq!(json["is_paid_ready"], false);
        assert!(json.get("checkout_url").is_none());

        let redirect = StartCheckoutResponse::from(CheckoutOutcome::Redirect {
            checkout_url: "https://pay.test/cs_1".into(),
            session_id: "cs_1".into(),
        });
        assert_eq!(redirect.checkout_url.as_deref(), Some("https://pay.test/cs_1"));
        assert!(!redirect.is_paid_ready);
    }

    #[test]
    fn test_create_intent_accepts_provider_aliases() {
        let req: CreateIntentRequest = serde_json::from_str(
            r#"{
                "email": "a@acme.test",
                "full_name": "Ada",
                "company_name": "Acme",
                "plan_id": "starter",
                "modules": ["sales", "sales", "inventory"],
                "provider": "provider-b",
                "payment_method_ref": "mp_tok_123",
                "billing_country": "AR"
            }"#,
        )
        .unwrap();
        assert_eq!(req.provider, Some(PaymentProvider::MercadoPago));
        assert_eq!(req.details().modules.len(), 2);
    }

    #[test]
    fn test_finalize_request_debug_redacts() {
        let req = FinalizeRequest {
            password: "hunter22".into(),
        };
        assert!(!format!("{req:?}").contains("hunter22"));
    }
}
