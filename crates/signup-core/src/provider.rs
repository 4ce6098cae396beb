//! Payment provider selection by billing jurisdiction.

use serde::{Deserialize, Serialize};

use crate::error::SignupError;

/// Billing country routed to MercadoPago
pub const MERCADOPAGO_COUNTRY: &str = "AR";

/// External payment processor identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentProvider {
    /// provider-a: redirect/setup-widget capture
    #[serde(rename = "stripe", alias = "provider-a")]
    Stripe,
    /// provider-b: inline card-token capture
    #[serde(rename = "mercadopago", alias = "provider-b")]
    MercadoPago,
}

impl PaymentProvider {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::MercadoPago => "mercadopago",
        }
    }
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentProvider {
    type Err = SignupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stripe" | "provider-a" => Ok(Self::Stripe),
            "mercadopago" | "provider-b" => Ok(Self::MercadoPago),
            other => Err(SignupError::Validation(format!(
                "unknown payment provider: {other}"
            ))),
        }
    }
}

/// Resolve the processor for a billing country.
///
/// Pure and deterministic; the result is stored on the intent once.
pub fn select_provider(billing_country: &str) -> PaymentProvider {
    if billing_country.trim().eq_ignore_ascii_case(MERCADOPAGO_COUNTRY) {
        PaymentProvider::MercadoPago
    } else {
        PaymentProvider::Stripe
    }
}
