//! HTTP Handlers

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;

use signup_core::api::{
    CardSummary, CreateIntentRequest, CreateIntentResponse, CreateSetupRequest,
    CreateSetupResponse, FinalizeRequest, FinalizeResponse, IntentStatusResponse,
    MarkReadyRequest, SavePaymentMethodRequest, StartCheckoutRequest, StartCheckoutResponse,
    StatusQuery,
};
use signup_core::processor::ReturnUrls;
use signup_core::{ErrorKind, ErrorReport, IntentId, PaymentProvider, SignupError};
use signup_payments::WebhookOutcome;

use crate::state::AppState;

/// Every failure leaves as a normalized report
pub type HandlerError = (StatusCode, Json<ErrorReport>);

type HandlerResult<T> = Result<Json<T>, HandlerError>;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub processors: Vec<ProcessorHealth>,
    pub stripe_webhook: bool,
}

#[derive(Serialize)]
pub struct ProcessorHealth {
    pub provider: PaymentProvider,
    pub configured: bool,
    pub reachable: bool,
}

// ============================================================================
// Error mapping
// ============================================================================

pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::RecoveryDataMissing => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Provider => StatusCode::PAYMENT_REQUIRED,
        ErrorKind::IntentNotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidTransition | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Config => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Network => StatusCode::BAD_GATEWAY,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &SignupError, intent_id: Option<&IntentId>) -> HandlerError {
    let report = err.report(intent_id);
    let status = status_for(report.kind);
    if status.is_server_error() {
        tracing::error!(intent_id = ?intent_id.map(IntentId::as_str), error = %err, "Signup request failed");
    } else {
        tracing::warn!(intent_id = ?intent_id.map(IntentId::as_str), error = %err, "Signup request rejected");
    }
    (status, Json(report))
}

fn reject(status: StatusCode, kind: ErrorKind, message: &str) -> HandlerError {
    (status, Json(ErrorReport::new(kind, message)))
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.service.processors();
    let mut processors = Vec::new();
    for provider in [PaymentProvider::Stripe, PaymentProvider::MercadoPago] {
        let health = match registry.get(provider) {
            Ok(processor) => ProcessorHealth {
                provider,
                configured: true,
                reachable: processor.health_check().await,
            },
            Err(_) => ProcessorHealth {
                provider,
                configured: false,
                reachable: false,
            },
        };
        processors.push(health);
    }

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        processors,
        stripe_webhook: state.stripe_webhook.is_some(),
    })
}

/// Create a setup object for the embedded card widget
pub async fn create_setup(
    State(state): State<AppState>,
    Json(payload): Json<CreateSetupRequest>,
) -> HandlerResult<CreateSetupResponse> {
    state
        .service
        .create_setup(payload)
        .await
        .map(Json)
        .map_err(|e| error_response(&e, None))
}

/// Verify a captured payment method
pub async fn save_payment_method(
    State(state): State<AppState>,
    Json(payload): Json<SavePaymentMethodRequest>,
) -> HandlerResult<CardSummary> {
    state
        .service
        .save_payment_method(&payload)
        .await
        .map(Json)
        .map_err(|e| error_response(&e, None))
}

/// Record a new signup intent
pub async fn create_intent(
    State(state): State<AppState>,
    Json(payload): Json<CreateIntentRequest>,
) -> Result<(StatusCode, Json<CreateIntentResponse>), HandlerError> {
    state
        .service
        .create_intent(payload)
        .await
        .map(|created| (StatusCode::CREATED, Json(created)))
        .map_err(|e| error_response(&e, None))
}

/// Start or resume checkout for an intent
pub async fn start_checkout(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<StartCheckoutRequest>,
) -> HandlerResult<StartCheckoutResponse> {
    let id = IntentId::from_string(id);
    let urls = ReturnUrls::from(payload);
    state
        .service
        .start_checkout(&id, &urls)
        .await
        .map(Json)
        .map_err(|e| error_response(&e, Some(&id)))
}

/// Poll the server-side status of an intent
pub async fn get_intent_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> HandlerResult<IntentStatusResponse> {
    let id = IntentId::from_string(id);
    state
        .service
        .get_intent_status(&id, query.restart)
        .await
        .map(Json)
        .map_err(|e| error_response(&e, Some(&id)))
}

/// Confirm a hosted checkout with the processor
pub async fn mark_intent_ready(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<MarkReadyRequest>,
) -> HandlerResult<IntentStatusResponse> {
    let id = IntentId::from_string(id);
    state
        .service
        .mark_intent_ready(&id, payload.external_session_id.as_deref())
        .await
        .map(Json)
        .map_err(|e| error_response(&e, Some(&id)))
}

/// Create the tenant for an authorized intent
pub async fn finalize_signup(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<FinalizeRequest>,
) -> HandlerResult<FinalizeResponse> {
    let id = IntentId::from_string(id);
    state
        .service
        .finalize_signup(&id, &payload.password)
        .await
        .map(Json)
        .map_err(|e| error_response(&e, Some(&id)))
}

/// Stripe webhook handler
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, HandlerError> {
    let handler = state.stripe_webhook.as_ref().ok_or_else(|| {
        reject(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Config,
            "Stripe webhooks are not configured",
        )
    })?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            reject(
                StatusCode::BAD_REQUEST,
                ErrorKind::Validation,
                "Missing Stripe signature",
            )
        })?;

    let event = handler.parse_event(&body, signature).map_err(|e| {
        tracing::warn!("Webhook signature failed: {}", e);
        reject(StatusCode::BAD_REQUEST, ErrorKind::Validation, "Invalid signature")
    })?;

    match handler.handle(&event).await {
        Ok(WebhookOutcome::IntentUpdated { .. } | WebhookOutcome::Ignored) => Ok(StatusCode::OK),
        Err(e) => Err(error_response(&e, None)),
    }
}
