//! API Client
//!
//! Every failure leaves this module as an [`ErrorReport`]; callers never see
//! transport errors or raw response bodies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use signup_core::api::{
    CardSummary, CreateIntentRequest, CreateIntentResponse, CreateSetupRequest,
    CreateSetupResponse, FinalizeRequest, FinalizeResponse, IntentStatusResponse,
    MarkReadyRequest, SavePaymentMethodRequest, StartCheckoutRequest, StartCheckoutResponse,
};
use signup_core::{ErrorKind, ErrorReport, IntentId, SignupService};

/// Default server when `SIGNUP_API_URL` is unset
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// The signup operations as seen from the client
#[async_trait]
pub trait SignupApi: Send + Sync {
    async fn create_setup(&self, req: &CreateSetupRequest)
        -> Result<CreateSetupResponse, ErrorReport>;

    async fn save_payment_method(
        &self,
        req: &SavePaymentMethodRequest,
    ) -> Result<CardSummary, ErrorReport>;

    async fn create_intent(
        &self,
        req: &CreateIntentRequest,
    ) -> Result<CreateIntentResponse, ErrorReport>;

    async fn start_checkout(
        &self,
        id: &IntentId,
        req: &StartCheckoutRequest,
    ) -> Result<StartCheckoutResponse, ErrorReport>;

    /// One poll; `restart` marks the first poll after a user retry
    async fn get_intent_status(
        &self,
        id: &IntentId,
        restart: bool,
    ) -> Result<IntentStatusResponse, ErrorReport>;

    async fn mark_intent_ready(
        &self,
        id: &IntentId,
        external_session_id: Option<&str>,
    ) -> Result<IntentStatusResponse, ErrorReport>;

    async fn finalize_signup(
        &self,
        id: &IntentId,
        password: &str,
    ) -> Result<FinalizeResponse, ErrorReport>;
}

/// `SignupApi` over HTTP against the signup server
pub struct HttpSignupApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSignupApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ErrorReport> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                ErrorReport::new(ErrorKind::Config, format!("HTTP client unavailable: {e}"))
            })?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Build from `SIGNUP_API_URL`
    pub fn from_env() -> Result<Self, ErrorReport> {
        let base_url =
            std::env::var("SIGNUP_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Self::new(base_url)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn intent_url(&self, id: &IntentId, action: &str) -> String {
        self.url(&format!("/api/signup/intents/{id}/{action}"))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        intent_id: Option<&IntentId>,
    ) -> Result<T, ErrorReport> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(&e, intent_id))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(&e, intent_id))?;
        decode(status, &body, intent_id)
    }
}

#[async_trait]
impl SignupApi for HttpSignupApi {
    async fn create_setup(
        &self,
        req: &CreateSetupRequest,
    ) -> Result<CreateSetupResponse, ErrorReport> {
        let request = self.http.post(self.url("/api/signup/setup")).json(req);
        self.send(request, None).await
    }

    async fn save_payment_method(
        &self,
        req: &SavePaymentMethodRequest,
    ) -> Result<CardSummary, ErrorReport> {
        let request = self
            .http
            .post(self.url("/api/signup/payment-method"))
            .json(req);
        self.send(request, None).await
    }

    async fn create_intent(
        &self,
        req: &CreateIntentRequest,
    ) -> Result<CreateIntentResponse, ErrorReport> {
        let request = self.http.post(self.url("/api/signup/intents")).json(req);
        self.send(request, None).await
    }

    async fn start_checkout(
        &self,
        id: &IntentId,
        req: &StartCheckoutRequest,
    ) -> Result<StartCheckoutResponse, ErrorReport> {
        let request = self.http.post(self.intent_url(id, "checkout")).json(req);
        self.send(request, Some(id)).await
    }

    async fn get_intent_status(
        &self,
        id: &IntentId,
        restart: bool,
    ) -> Result<IntentStatusResponse, ErrorReport> {
        let mut request = self.http.get(self.intent_url(id, "status"));
        if restart {
            request = request.query(&[("restart", "true")]);
        }
        self.send(request, Some(id)).await
    }

    async fn mark_intent_ready(
        &self,
        id: &IntentId,
        external_session_id: Option<&str>,
    ) -> Result<IntentStatusResponse, ErrorReport> {
        let body = MarkReadyRequest {
            external_session_id: external_session_id.map(str::to_string),
        };
        let request = self.http.post(self.intent_url(id, "ready")).json(&body);
        self.send(request, Some(id)).await
    }

    async fn finalize_signup(
        &self,
        id: &IntentId,
        password: &str,
    ) -> Result<FinalizeResponse, ErrorReport> {
        let body = FinalizeRequest {
            password: password.to_string(),
        };
        let request = self.http.post(self.intent_url(id, "finalize")).json(&body);
        self.send(request, Some(id)).await
    }
}

fn transport_error(e: &reqwest::Error, intent_id: Option<&IntentId>) -> ErrorReport {
    tracing::debug!("Signup API transport error: {}", e);
    let report = ErrorReport::new(
        ErrorKind::Network,
        "We could not reach the server. Please try again.",
    );
    attach(report, intent_id)
}

fn attach(report: ErrorReport, intent_id: Option<&IntentId>) -> ErrorReport {
    match (report.intent_id.is_some(), intent_id) {
        (false, Some(id)) => report.with_intent(id),
        _ => report,
    }
}

/// Map a response onto `T` or a normalized report
fn decode<T: DeserializeOwned>(
    status: StatusCode,
    body: &[u8],
    intent_id: Option<&IntentId>,
) -> Result<T, ErrorReport> {
    if status.is_success() {
        return serde_json::from_slice(body).map_err(|e| {
            tracing::warn!("Unexpected signup API response: {}", e);
            attach(
                ErrorReport::new(ErrorKind::Unknown, "Unexpected response from the server."),
                intent_id,
            )
        });
    }

    if let Ok(report) = serde_json::from_slice::<ErrorReport>(body) {
        return Err(attach(report, intent_id));
    }

    // Gateways in front of the server answer without a report body.
    let report = match status {
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            ErrorReport::new(
                ErrorKind::Network,
                "We could not reach the server. Please try again.",
            )
        }
        _ => ErrorReport::new(
            ErrorKind::Unknown,
            format!("Request failed (HTTP {}).", status.as_u16()),
        ),
    };
    Err(attach(report, intent_id))
}

/// `SignupApi` served by an in-process [`SignupService`]
///
/// Used by embedded deployments and tests.
pub struct LocalSignupApi {
    service: Arc<SignupService>,
}

impl LocalSignupApi {
    pub const fn new(service: Arc<SignupService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl SignupApi for LocalSignupApi {
    async fn create_setup(
        &self,
        req: &CreateSetupRequest,
    ) -> Result<CreateSetupResponse, ErrorReport> {
        self.service
            .create_setup(req.clone())
            .await
            .map_err(|e| e.report(None))
    }

    async fn save_payment_method(
        &self,
        req: &SavePaymentMethodRequest,
    ) -> Result<CardSummary, ErrorReport> {
        self.service
            .save_payment_method(req)
            .await
            .map_err(|e| e.report(None))
    }

    async fn create_intent(
        &self,
        req: &CreateIntentRequest,
    ) -> Result<CreateIntentResponse, ErrorReport> {
        self.service
            .create_intent(req.clone())
            .await
            .map_err(|e| e.report(None))
    }

    async fn start_checkout(
        &self,
        id: &IntentId,
        req: &StartCheckoutRequest,
    ) -> Result<StartCheckoutResponse, ErrorReport> {
        self.service
            .start_checkout(id, &req.clone().into())
            .await
            .map_err(|e| e.report(Some(id)))
    }

    async fn get_intent_status(
        &self,
        id: &IntentId,
        restart: bool,
    ) -> Result<IntentStatusResponse, ErrorReport> {
        self.service
            .get_intent_status(id, restart)
            .await
            .map_err(|e| e.report(Some(id)))
    }

    async fn mark_intent_ready(
        &self,
        id: &IntentId,
        external_session_id: Option<&str>,
    ) -> Result<IntentStatusResponse, ErrorReport> {
        self.service
            .mark_intent_ready(id, external_session_id)
            .await
            .map_err(|e| e.report(Some(id)))
    }

    async fn finalize_signup(
        &self,
        id: &IntentId,
        password: &str,
    ) -> Result<FinalizeResponse, ErrorReport> {
        self.service
            .finalize_signup(id, password)
            .await
            .map_err(|e| e.report(Some(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_success() {
        let body = br#"{"intent_id":"int_1","status":"PAID_READY","attempts":3}"#;
        let status: IntentStatusResponse = decode(StatusCode::OK, body, None).unwrap();
        assert_eq!(status.attempts, 3);
    }

    #[test]
    fn test_decode_keeps_server_report() {
        let id = IntentId::from_string("int_1");
        let body = br#"{"kind":"provider","message":"Your card was declined."}"#;
        let report =
            decode::<CardSummary>(StatusCode::PAYMENT_REQUIRED, body, Some(&id)).unwrap_err();
        assert_eq!(report.kind, ErrorKind::Provider);
        assert_eq!(report.message, "Your card was declined.");
        assert_eq!(report.intent_id, Some(id));
    }

    #[test]
    fn test_decode_gateway_error_is_transient() {
        let report =
            decode::<CardSummary>(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>", None)
                .unwrap_err();
        assert!(report.is_transient());
    }

    #[test]
    fn test_decode_unknown_failure() {
        let id = IntentId::from_string("int_9");
        let report = decode::<CardSummary>(StatusCode::IM_A_TEAPOT, b"", Some(&id)).unwrap_err();
        assert_eq!(report.kind, ErrorKind::Unknown);
        assert_eq!(report.message, "Request failed (HTTP 418).");
        assert_eq!(report.intent_id, Some(id));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let api = HttpSignupApi::new("http://signup.test/").unwrap();
        let id = IntentId::from_string("int_1");
        assert_eq!(
            api.intent_url(&id, "status"),
            "http://signup.test/api/signup/intents/int_1/status"
        );
    }
}
