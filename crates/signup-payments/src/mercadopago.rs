//! MercadoPago Processor
//!
//! Inline capture: the embedded card form tokenizes the card in the browser
//! and hands us a single-use token, which is saved to a MercadoPago customer
//! here. There is no redirect and nothing to confirm afterwards.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use signup_core::api::CardSummary;
use signup_core::processor::{CaptureMode, PaymentMethodRequest, PaymentProcessor};
use signup_core::PaymentProvider;

use crate::error::PaymentError;

const PROVIDER: &str = "mercadopago";

/// MercadoPago configuration
#[derive(Clone, Debug)]
pub struct MercadoPagoConfig {
    pub access_token: String,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl MercadoPagoConfig {
    pub const DEFAULT_API_BASE: &'static str = "https://api.mercadopago.com";

    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            api_base: Self::DEFAULT_API_BASE.into(),
            timeout_secs: 15,
        }
    }

    pub fn from_env() -> Result<Self, PaymentError> {
        let access_token = std::env::var("MERCADOPAGO_ACCESS_TOKEN")
            .map_err(|_| PaymentError::Config("MERCADOPAGO_ACCESS_TOKEN not set".into()))?;
        let api_base = std::env::var("MERCADOPAGO_API_BASE")
            .unwrap_or_else(|_| Self::DEFAULT_API_BASE.into());

        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            ..Self::new(access_token)
        })
    }
}

#[derive(Debug, Deserialize)]
struct CustomerSearch {
    #[serde(default)]
    results: Vec<CustomerRecord>,
}

#[derive(Debug, Deserialize)]
struct CustomerRecord {
    id: String,
}

#[derive(Debug, Serialize)]
struct NewCustomer<'a> {
    email: &'a str,
    first_name: &'a str,
}

#[derive(Debug, Serialize)]
struct NewCard<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct SavedCard {
    last_four_digits: String,
    payment_method: CardPaymentMethod,
}

#[derive(Debug, Deserialize)]
struct CardPaymentMethod {
    id: String,
}

/// Error body returned by the MercadoPago API
#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    cause: Vec<ApiErrorCause>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorCause {
    #[serde(default)]
    description: String,
}

impl ApiError {
    fn reason(&self) -> String {
        self.cause
            .iter()
            .map(|c| c.description.as_str())
            .find(|d| !d.is_empty())
            .unwrap_or(&self.message)
            .to_string()
    }
}

/// MercadoPago REST client
pub struct MercadoPagoProcessor {
    http: Client,
    config: MercadoPagoConfig,
}

impl MercadoPagoProcessor {
    pub fn new(config: MercadoPagoConfig) -> Result<Self, PaymentError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaymentError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> Result<Self, PaymentError> {
        Self::new(MercadoPagoConfig::from_env()?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base)
    }

    async fn find_or_create_customer(&self, email: &str, full_name: &str) -> Result<String, PaymentError> {
        let response = self
            .http
            .get(self.url("/v1/customers/search"))
            .bearer_auth(&self.config.access_token)
            .query(&[("email", email)])
            .send()
            .await
            .map_err(transport_error)?;
        let search: CustomerSearch = read_json(response).await?;
        if let Some(existing) = search.results.into_iter().next() {
            return Ok(existing.id);
        }

        let response = self
            .http
            .post(self.url("/v1/customers"))
            .bearer_auth(&self.config.access_token)
            .json(&NewCustomer {
                email,
                first_name: full_name,
            })
            .send()
            .await
            .map_err(transport_error)?;
        let created: CustomerRecord = read_json(response).await?;
        tracing::debug!(customer_id = %created.id, "Created MercadoPago customer");
        Ok(created.id)
    }
}

fn transport_error(err: reqwest::Error) -> PaymentError {
    PaymentError::Unavailable {
        provider: PROVIDER,
        message: err.to_string(),
    }
}

/// Decode a success body, or classify the failure by status.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, PaymentError> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;
    parse_response(status, &body)
}

fn parse_response<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, PaymentError> {
    if status.is_success() {
        return serde_json::from_str(body).map_err(|e| PaymentError::UnexpectedResponse {
            provider: PROVIDER,
            message: e.to_string(),
        });
    }

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(PaymentError::Unavailable {
            provider: PROVIDER,
            message: format!("HTTP {status}"),
        });
    }

    let error: ApiError = serde_json::from_str(body).unwrap_or_default();
    let reason = error.reason();
    Err(PaymentError::Rejected {
        provider: PROVIDER,
        message: if reason.is_empty() {
            "The card was rejected.".into()
        } else {
            reason
        },
    })
}

#[async_trait]
impl PaymentProcessor for MercadoPagoProcessor {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::MercadoPago
    }

    fn capture_mode(&self) -> CaptureMode {
        CaptureMode::Inline
    }

    async fn save_payment_method(
        &self,
        request: &PaymentMethodRequest,
    ) -> signup_core::Result<CardSummary> {
        let token = request.payment_method_ref.trim();
        if token.is_empty() {
            return Err(PaymentError::InvalidReference("empty card token".into()).into());
        }

        let customer_id = self
            .find_or_create_customer(&request.email, &request.full_name)
            .await?;

        let response = self
            .http
            .post(self.url(&format!("/v1/customers/{customer_id}/cards")))
            .bearer_auth(&self.config.access_token)
            .json(&NewCard { token })
            .send()
            .await
            .map_err(transport_error)?;
        let card: SavedCard = read_json(response).await?;

        Ok(CardSummary {
            last4: card.last_four_digits,
            brand: card.payment_method.id,
        })
    }

    async fn health_check(&self) -> bool {
        self.http
            .get(self.url("/v1/payment_methods"))
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_saved_card() {
        let body = r#"{
            "id": "1562188766852",
            "customer_id": "470183340-cx0uxQyBYsZmvT",
            "expiration_month": 11,
            "expiration_year": 2030,
            "first_six_digits": "503143",
            "last_four_digits": "6351",
            "payment_method": {
                "id": "master",
                "name": "Mastercard",
                "payment_type_id": "credit_card"
            }
        }"#;
        let card: SavedCard = parse_response(StatusCode::CREATED, body).unwrap();
        assert_eq!(card.last_four_digits, "6351");
        assert_eq!(card.payment_method.id, "master");
    }

    #[test]
    fn test_rejection_uses_cause_description() {
        let body = r#"{
            "message": "bad request",
            "error": "bad_request",
            "status": 400,
            "cause": [{"code": "E301", "description": "Invalid card number"}]
        }"#;
        let err = parse_response::<SavedCard>(StatusCode::BAD_REQUEST, body).unwrap_err();
        match err {
            PaymentError::Rejected { message, .. } => assert_eq!(message, "Invalid card number"),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_server_errors_are_transient() {
        let err = parse_response::<SavedCard>(StatusCode::BAD_GATEWAY, "<html>").unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_unreadable_rejection_still_rejects() {
        let err = parse_response::<SavedCard>(StatusCode::UNPROCESSABLE_ENTITY, "").unwrap_err();
        assert!(matches!(err, PaymentError::Rejected { .. }));
    }

    #[test]
    fn test_customer_search_shape() {
        let search: CustomerSearch = parse_response(
            StatusCode::OK,
            r#"{"paging": {"total": 1}, "results": [{"id": "123-abc", "email": "a@b.ar"}]}"#,
        )
        .unwrap();
        assert_eq!(search.results[0].id, "123-abc");
    }
}
