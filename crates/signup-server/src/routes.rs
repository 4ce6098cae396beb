//! Router

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    create_intent, create_setup, finalize_signup, get_intent_status, health_check,
    mark_intent_ready, save_payment_method, start_checkout, stripe_webhook,
};
use crate::state::AppState;

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health_check))

        // Signup pipeline
        .route("/api/signup/setup", post(create_setup))
        .route("/api/signup/payment-method", post(save_payment_method))
        .route("/api/signup/intents", post(create_intent))
        .route("/api/signup/intents/{id}/checkout", post(start_checkout))
        .route("/api/signup/intents/{id}/status", get(get_intent_status))
        .route("/api/signup/intents/{id}/ready", post(mark_intent_ready))
        .route("/api/signup/intents/{id}/finalize", post(finalize_signup))

        // Payments
        .route("/webhook/stripe", post(stripe_webhook))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use signup_core::{
        MemoryAccountDirectory, MemoryIntentStore, MockProcessor, PlanCatalog, ProcessorRegistry,
        SignupService,
    };
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        let processors = ProcessorRegistry::new()
            .with(Arc::new(MockProcessor::stripe().auto_completing()))
            .with(Arc::new(MockProcessor::mercadopago()));
        let service = SignupService::new(
            Arc::new(MemoryIntentStore::new()),
            processors,
            Arc::new(MemoryAccountDirectory::new()),
            PlanCatalog::default(),
        );
        router(AppState::new(Arc::new(service), None))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn signup(country: &str, plan: &str, payment_method_ref: Option<&str>) -> Value {
        json!({
            "email": "owner@acme.test",
            "full_name": "Ada Owner",
            "company_name": "Acme SRL",
            "plan_id": plan,
            "modules": ["inventory", "sales"],
            "payment_method_ref": payment_method_ref,
            "billing_country": country,
        })
    }

    fn return_urls() -> Value {
        json!({
            "success_url": "https://app.test/signup/confirm",
            "cancel_url": "https://app.test/signup",
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(&app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["processors"][0]["configured"], true);
        assert_eq!(body["stripe_webhook"], false);
    }

    #[tokio::test]
    async fn test_inline_signup_finalizes_once() {
        let app = app();
        let (status, created) = call(
            &app,
            "POST",
            "/api/signup/intents",
            Some(signup("AR", "starter", Some("mp_tok_123"))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["payment_provider"], "mercadopago");
        let id = created["intent_id"].as_str().unwrap().to_string();

        let (status, checkout) = call(
            &app,
            "POST",
            &format!("/api/signup/intents/{id}/checkout"),
            Some(return_urls()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(checkout["is_paid_ready"], true);
        assert!(checkout.get("checkout_url").is_none());

        let finalize_uri = format!("/api/signup/intents/{id}/finalize");
        let password = json!({ "password": "s3cret-pass" });
        let (status, first) = call(&app, "POST", &finalize_uri, Some(password.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["created"], true);

        let (status, second) = call(&app, "POST", &finalize_uri, Some(password)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["created"], false);
        assert_eq!(first["company"]["id"], second["company"]["id"]);
    }

    #[tokio::test]
    async fn test_hosted_checkout_confirmation() {
        let app = app();
        let (_, created) = call(
            &app,
            "POST",
            "/api/signup/intents",
            Some(signup("US", "business", None)),
        )
        .await;
        let id = created["intent_id"].as_str().unwrap().to_string();

        let (_, checkout) = call(
            &app,
            "POST",
            &format!("/api/signup/intents/{id}/checkout"),
            Some(return_urls()),
        )
        .await;
        let session_id = checkout["session_id"].as_str().unwrap().to_string();
        assert!(checkout["checkout_url"].as_str().unwrap().contains(&session_id));

        let (_, polled) = call(&app, "GET", &format!("/api/signup/intents/{id}/status"), None).await;
        assert_eq!(polled["status"], "CHECKOUT_CREATED");
        assert_eq!(polled["attempts"], 1);

        let (status, ready) = call(
            &app,
            "POST",
            &format!("/api/signup/intents/{id}/ready"),
            Some(json!({ "external_session_id": session_id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ready["status"], "PAID_READY");

        let (_, restarted) = call(
            &app,
            "GET",
            &format!("/api/signup/intents/{id}/status?restart=true"),
            None,
        )
        .await;
        assert_eq!(restarted["attempts"], 1);
    }

    #[tokio::test]
    async fn test_free_trial_needs_no_processor() {
        let app = app();
        let (_, created) = call(
            &app,
            "POST",
            "/api/signup/intents",
            Some(signup("US", "trial", None)),
        )
        .await;
        let id = created["intent_id"].as_str().unwrap().to_string();

        let (_, checkout) = call(
            &app,
            "POST",
            &format!("/api/signup/intents/{id}/checkout"),
            Some(return_urls()),
        )
        .await;
        assert_eq!(checkout["is_free_trial"], true);
        assert!(checkout.get("checkout_url").is_none());
    }

    #[tokio::test]
    async fn test_validation_error_shape() {
        let mut body = signup("US", "starter", None);
        body["company_name"] = json!("");
        let (status, report) = call(&app(), "POST", "/api/signup/intents", Some(body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(report["kind"], "validation");
        assert_eq!(report["message"], "Missing required fields: company_name");
    }

    #[tokio::test]
    async fn test_unknown_intent_is_not_found() {
        let (status, report) = call(
            &app(),
            "GET",
            "/api/signup/intents/int_missing/status",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(report["kind"], "intent_not_found");
        assert_eq!(report["intent_id"], "int_missing");
    }

    #[tokio::test]
    async fn test_failed_finalize_keeps_intent_ready() {
        let app = app();
        let (_, created) = call(
            &app,
            "POST",
            "/api/signup/intents",
            Some(signup("AR", "starter", Some("mp_tok_123"))),
        )
        .await;
        let id = created["intent_id"].as_str().unwrap().to_string();
        call(
            &app,
            "POST",
            &format!("/api/signup/intents/{id}/checkout"),
            Some(return_urls()),
        )
        .await;

        let (status, report) = call(
            &app,
            "POST",
            &format!("/api/signup/intents/{id}/finalize"),
            Some(json!({ "password": "short" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(report["intent_id"], id.as_str());

        let (_, polled) = call(&app, "GET", &format!("/api/signup/intents/{id}/status"), None).await;
        assert_eq!(polled["status"], "PAID_READY");
    }

    #[tokio::test]
    async fn test_declined_card_is_payment_required() {
        let (status, report) = call(
            &app(),
            "POST",
            "/api/signup/payment-method",
            Some(json!({
                "email": "owner@acme.test",
                "full_name": "Ada Owner",
                "billing_country": "AR",
                "provider": "mercadopago",
                "payment_method_ref": "tok_decline_9999",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(report["message"], "Your card was declined.");
    }

    #[tokio::test]
    async fn test_webhook_disabled_without_secret() {
        let (status, report) = call(&app(), "POST", "/webhook/stripe", Some(json!({}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report["kind"], "config");
    }
}
