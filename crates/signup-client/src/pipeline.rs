//! Signup Pipeline
//!
//! Drives one signup from form submission to a provisioned company and
//! tells the host where to go next. The host renders; it never decides.
//!
//! ```text
//! begin ──▶ save card? ──▶ create intent ──▶ cache ──▶ start checkout
//!                                                        │
//!              ┌─────────────── redirect ────────────────┤
//!              ▼                                         ▼ paid / trial
//!   NavigateTo(checkout) ··· resume ──▶ poll ──▶ finalize ──▶ Completed
//!                                         │
//!                                 TimedOut / Failed ──▶ retry
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use signup_core::account::validate_password;
use signup_core::api::{
    CardSummary, CreateIntentRequest, CreateSetupRequest, SavePaymentMethodRequest, StartCheckoutRequest,
};
use signup_core::processor::ReturnUrls;
use signup_core::{
    select_provider, Company, ErrorKind, ErrorReport, IntentId, PaymentProvider,
};
use tokio::sync::Mutex;

use crate::api::SignupApi;
use crate::cache::RecoveryCache;
use crate::poller::{ConfirmationPoller, PollCursor, PollOutcome, PollerConfig};

/// What the host should do next
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum Navigation {
    /// Leave for the processor's hosted checkout
    NavigateTo(String),
    /// Tenant is provisioned
    Completed(Company),
    /// Still unconfirmed after the attempt ceiling; offer `retry`
    TimedOut { attempts: u32 },
    /// Show the message; `retry` or restart the signup
    Failed(ErrorReport),
}

/// Everything the signup form collects
#[derive(Clone)]
pub struct SignupForm {
    pub email: String,
    pub full_name: String,
    pub company_name: String,
    pub plan_id: String,
    pub modules: Vec<String>,
    pub billing_country: String,
    pub password: String,
    /// Token from the card widget, when the form embeds one
    pub payment_method_ref: Option<String>,
}

impl std::fmt::Debug for SignupForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupForm")
            .field("email", &self.email)
            .field("company_name", &self.company_name)
            .field("plan_id", &self.plan_id)
            .field("billing_country", &self.billing_country)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl SignupForm {
    pub fn provider(&self) -> PaymentProvider {
        select_provider(&self.billing_country)
    }

    fn intent_request(&self) -> CreateIntentRequest {
        CreateIntentRequest {
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            company_name: self.company_name.clone(),
            plan_id: self.plan_id.clone(),
            modules: self.modules.clone(),
            provider: Some(self.provider()),
            payment_method_ref: self.payment_method_ref.clone(),
            billing_country: self.billing_country.clone(),
        }
    }

    /// Checks that need no server round trip
    fn validate(&self) -> Result<(), ErrorReport> {
        self.intent_request()
            .details()
            .validated()
            .map_err(|e| e.report(None))?;
        validate_password(&self.password).map_err(|e| e.report(None))
    }
}

/// Query parameters on the hosted-checkout return URL
///
/// `None` when the URL does not carry an intent id.
pub fn return_params(url: &str) -> Option<(IntentId, Option<String>)> {
    let url = reqwest::Url::parse(url).ok()?;
    let mut intent_id = None;
    let mut session_id = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "intent_id" if !value.is_empty() => {
                intent_id = Some(IntentId::from_string(value.into_owned()));
            }
            "session_id" if !value.is_empty() => session_id = Some(value.into_owned()),
            _ => {}
        }
    }
    intent_id.map(|id| (id, session_id))
}

/// Releases the finalize flag when dropped
struct FinalizeGuard<'a>(&'a AtomicBool);

impl<'a> FinalizeGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FinalizeGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Client-side signup orchestration
pub struct SignupPipeline {
    api: Arc<dyn SignupApi>,
    cache: RecoveryCache,
    poller: ConfirmationPoller,
    urls: ReturnUrls,
    cursor: Mutex<Option<PollCursor>>,
    finalizing: AtomicBool,
}

impl SignupPipeline {
    pub fn new(
        api: Arc<dyn SignupApi>,
        cache: RecoveryCache,
        poller: PollerConfig,
        urls: ReturnUrls,
    ) -> Self {
        Self {
            poller: ConfirmationPoller::new(api.clone(), poller),
            api,
            cache,
            urls,
            cursor: Mutex::new(None),
            finalizing: AtomicBool::new(false),
        }
    }

    /// Client secret for the embedded card widget (redirect-style provider)
    pub async fn setup_card(&self, email: &str, full_name: &str) -> Result<String, ErrorReport> {
        let req = CreateSetupRequest {
            email: email.to_string(),
            full_name: full_name.to_string(),
        };
        self.api
            .create_setup(&req)
            .await
            .map(|setup| setup.client_secret)
    }

    /// Submit the signup form
    pub async fn begin(&self, form: &SignupForm) -> Navigation {
        match self.submit(form).await {
            Ok(navigation) => navigation,
            Err(report) => Navigation::Failed(report),
        }
    }

    async fn submit(&self, form: &SignupForm) -> Result<Navigation, ErrorReport> {
        form.validate()?;
        let provider = form.provider();

        if let Some(reference) = form.payment_method_ref.as_deref() {
            let card = self.save_card(form, provider, reference).await?;
            tracing::info!(
                provider = %provider,
                brand = %card.brand,
                last4 = %card.last4,
                "Card saved"
            );
        }

        let created = self.api.create_intent(&form.intent_request()).await?;
        let intent_id = created.intent_id;
        tracing::info!(intent_id = %intent_id, provider = %created.payment_provider, "Intent created");

        self.cache
            .save(&intent_id, &form.password)
            .await
            .map_err(|e| e.report(Some(&intent_id)))?;

        let checkout = self
            .api
            .start_checkout(
                &intent_id,
                &StartCheckoutRequest {
                    success_url: self.urls.success_url.clone(),
                    cancel_url: self.urls.cancel_url.clone(),
                },
            )
            .await?;

        if let Some(url) = checkout.checkout_url {
            tracing::info!(intent_id = %intent_id, "Redirecting to hosted checkout");
            *self.cursor.lock().await = Some(PollCursor::new(intent_id, checkout.session_id));
            return Ok(Navigation::NavigateTo(url));
        }

        *self.cursor.lock().await = Some(PollCursor::new(intent_id.clone(), None));
        if checkout.is_paid_ready || checkout.is_free_trial {
            return Ok(self.finalize(&intent_id, &form.password).await);
        }
        // Neither redirect nor ready: wait for the server to confirm.
        Ok(self.poll_then_finalize(PollCursor::new(intent_id, None)).await)
    }

    async fn save_card(
        &self,
        form: &SignupForm,
        provider: PaymentProvider,
        reference: &str,
    ) -> Result<CardSummary, ErrorReport> {
        let req = SavePaymentMethodRequest {
            email: form.email.clone(),
            full_name: form.full_name.clone(),
            billing_country: form.billing_country.clone(),
            provider,
            payment_method_ref: reference.to_string(),
        };
        self.api.save_payment_method(&req).await
    }

    /// Continue after returning from the hosted checkout
    ///
    /// Without a matching cached entry the signup is not finalized
    /// automatically.
    pub async fn resume(&self, intent_id: &IntentId, session_id: Option<String>) -> Navigation {
        if let Err(report) = self.recover_password(intent_id).await {
            return Navigation::Failed(report);
        }
        self.poll_then_finalize(PollCursor::new(intent_id.clone(), session_id))
            .await
    }

    /// Resume from the full return URL
    pub async fn resume_from_url(&self, url: &str) -> Navigation {
        match return_params(url) {
            Some((intent_id, session_id)) => self.resume(&intent_id, session_id).await,
            None => Navigation::Failed(recovery_missing(None)),
        }
    }

    /// Poll again after `TimedOut` or `Failed`
    pub async fn retry(&self) -> Navigation {
        let Some(mut cursor) = self.cursor.lock().await.take() else {
            return Navigation::Failed(recovery_missing(None));
        };
        cursor.reset();
        tracing::info!(intent_id = %cursor.intent_id(), "Retrying confirmation");
        self.poll_then_finalize(cursor).await
    }

    async fn poll_then_finalize(&self, mut cursor: PollCursor) -> Navigation {
        let outcome = self.poller.run(&mut cursor).await;
        let intent_id = cursor.intent_id().clone();
        *self.cursor.lock().await = Some(cursor);

        match outcome {
            PollOutcome::Ready | PollOutcome::Finalized => {
                match self.recover_password(&intent_id).await {
                    Ok(password) => self.finalize(&intent_id, &password).await,
                    Err(report) => Navigation::Failed(report),
                }
            }
            PollOutcome::TimedOut { attempts } => Navigation::TimedOut { attempts },
            PollOutcome::Failed(report) => Navigation::Failed(report),
        }
    }

    async fn recover_password(&self, intent_id: &IntentId) -> Result<String, ErrorReport> {
        match self.cache.load().await {
            Ok(Some(entry)) if entry.intent_id == *intent_id => Ok(entry.password),
            Ok(Some(entry)) => {
                tracing::warn!(
                    intent_id = %intent_id,
                    cached = %entry.intent_id,
                    "Recovery entry belongs to another intent"
                );
                Err(recovery_missing(Some(intent_id)))
            }
            Ok(None) => {
                tracing::warn!(intent_id = %intent_id, "No recovery entry on this device");
                Err(recovery_missing(Some(intent_id)))
            }
            Err(e) => {
                tracing::warn!(intent_id = %intent_id, "Recovery entry not usable: {}", e);
                Err(e.report(Some(intent_id)))
            }
        }
    }

    async fn finalize(&self, intent_id: &IntentId, password: &str) -> Navigation {
        let Some(_guard) = FinalizeGuard::acquire(&self.finalizing) else {
            return Navigation::Failed(
                ErrorReport::new(
                    ErrorKind::Conflict,
                    "Your account is already being created. Please wait.",
                )
                .with_intent(intent_id),
            );
        };

        match self.api.finalize_signup(intent_id, password).await {
            Ok(finalized) => {
                tracing::info!(
                    intent_id = %intent_id,
                    company_id = %finalized.company.id,
                    created = finalized.created,
                    "Signup finalized"
                );
                if let Err(e) = self.cache.purge().await {
                    tracing::warn!(intent_id = %intent_id, "Recovery entry not purged: {}", e);
                }
                self.cursor.lock().await.take();
                Navigation::Completed(finalized.company)
            }
            Err(report) => {
                tracing::warn!(intent_id = %intent_id, kind = ?report.kind, "Finalize failed");
                Navigation::Failed(report)
            }
        }
    }
}

fn recovery_missing(intent_id: Option<&IntentId>) -> ErrorReport {
    let report = ErrorReport::new(
        ErrorKind::RecoveryDataMissing,
        "We could not find your pending signup on this device. Please start the signup again.",
    );
    match intent_id {
        Some(id) => report.with_intent(id),
        None => report,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use signup_core::{
        IntentStatus, MemoryAccountDirectory, MemoryIntentStore, MockProcessor, PlanCatalog,
        ProcessorRegistry, SignupService,
    };

    use super::*;
    use crate::api::LocalSignupApi;
    use crate::cache::{MemoryStorage, RecoveryStorage, RECOVERY_KEY};
    use crate::poller::tests::{network, ScriptedApi};

    struct Harness {
        pipeline: SignupPipeline,
        stripe: Arc<MockProcessor>,
        accounts: Arc<MemoryAccountDirectory>,
        storage: Arc<MemoryStorage>,
    }

    fn urls() -> ReturnUrls {
        ReturnUrls {
            success_url: "https://app.test/signup/confirm".into(),
            cancel_url: "https://app.test/signup".into(),
        }
    }

    fn harness() -> Harness {
        let stripe = Arc::new(MockProcessor::stripe());
        let accounts = Arc::new(MemoryAccountDirectory::new());
        let service = SignupService::new(
            Arc::new(MemoryIntentStore::new()),
            ProcessorRegistry::new()
                .with(stripe.clone())
                .with(Arc::new(MockProcessor::mercadopago())),
            accounts.clone(),
            PlanCatalog::default(),
        );
        let storage = Arc::new(MemoryStorage::new());
        let pipeline = SignupPipeline::new(
            Arc::new(LocalSignupApi::new(Arc::new(service))),
            RecoveryCache::new(storage.clone(), chrono::Duration::hours(24)),
            PollerConfig::default(),
            urls(),
        );
        Harness {
            pipeline,
            stripe,
            accounts,
            storage,
        }
    }

    fn form(country: &str, plan: &str, payment_method_ref: Option<&str>) -> SignupForm {
        SignupForm {
            email: "owner@acme.test".into(),
            full_name: "Ada Owner".into(),
            company_name: "Acme SRL".into(),
            plan_id: plan.into(),
            modules: vec!["inventory".into(), "sales".into()],
            billing_country: country.into(),
            password: "s3cret-pass".into(),
            payment_method_ref: payment_method_ref.map(str::to_string),
        }
    }

    fn session_from(url: &str) -> String {
        url.rsplit('/').next().unwrap_or_default().to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn test_hosted_checkout_round_trip() {
        let h = harness();
        let Navigation::NavigateTo(url) = h.pipeline.begin(&form("US", "business", None)).await
        else {
            panic!("expected redirect");
        };
        let session_id = session_from(&url);
        let cached = h.pipeline.cache.load().await.unwrap().unwrap();

        h.stripe.complete_session(&session_id, "pm_card_visa").await;
        let navigation = h
            .pipeline
            .resume(&cached.intent_id, Some(session_id))
            .await;

        let Navigation::Completed(company) = navigation else {
            panic!("expected completion, got {navigation:?}");
        };
        assert_eq!(company.name, "Acme SRL");
        assert_eq!(h.accounts.tenants_created(), 1);
        assert!(h.storage.read(RECOVERY_KEY).await.unwrap().is_none());
        assert!(h
            .accounts
            .verify_owner("owner@acme.test", "s3cret-pass")
            .await
            .unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inline_card_finalizes_without_polling() {
        let h = harness();
        let navigation = h
            .pipeline
            .begin(&form("AR", "starter", Some("mp_tok_1234")))
            .await;

        assert!(matches!(navigation, Navigation::Completed(_)));
        assert_eq!(h.accounts.tenants_created(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_free_trial_completes() {
        let h = harness();
        let navigation = h.pipeline.begin(&form("US", "trial", None)).await;
        assert!(matches!(navigation, Navigation::Completed(_)));
        assert_eq!(h.stripe.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_declined_card_creates_no_intent() {
        let h = harness();
        let navigation = h
            .pipeline
            .begin(&form("AR", "starter", Some("tok_decline_1")))
            .await;

        let Navigation::Failed(report) = navigation else {
            panic!("expected failure");
        };
        assert_eq!(report.kind, ErrorKind::Provider);
        assert_eq!(report.message, "Your card was declined.");
        assert!(h.pipeline.cache.load().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_form_fails_locally() {
        let h = harness();
        let mut bad = form("US", "starter", None);
        bad.password = "short".into();

        let Navigation::Failed(report) = h.pipeline.begin(&bad).await else {
            panic!("expected failure");
        };
        assert_eq!(report.kind, ErrorKind::Validation);
        assert_eq!(report.intent_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_without_cache_does_not_finalize() {
        let h = harness();
        let Navigation::NavigateTo(url) = h.pipeline.begin(&form("US", "business", None)).await
        else {
            panic!("expected redirect");
        };
        let session_id = session_from(&url);
        let intent_id = h.pipeline.cache.load().await.unwrap().unwrap().intent_id;
        h.stripe.complete_session(&session_id, "pm_card_visa").await;
        h.pipeline.cache.purge().await.unwrap();

        let Navigation::Failed(report) = h.pipeline.resume(&intent_id, Some(session_id)).await
        else {
            panic!("expected failure");
        };
        assert_eq!(report.kind, ErrorKind::RecoveryDataMissing);
        assert_eq!(report.intent_id, Some(intent_id));
        assert_eq!(h.accounts.tenants_created(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_with_corrupt_cache_does_not_finalize() {
        let h = harness();
        h.storage.write(RECOVERY_KEY, "garbage").await.unwrap();

        let Navigation::Failed(report) = h
            .pipeline
            .resume(&IntentId::from_string("int_1"), None)
            .await
        else {
            panic!("expected failure");
        };
        assert_eq!(report.kind, ErrorKind::RecoveryDataMissing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_retry_completes() {
        let h = harness();
        let Navigation::NavigateTo(url) = h.pipeline.begin(&form("US", "business", None)).await
        else {
            panic!("expected redirect");
        };
        let session_id = session_from(&url);
        let intent_id = h.pipeline.cache.load().await.unwrap().unwrap().intent_id;

        let navigation = h
            .pipeline
            .resume(&intent_id, Some(session_id.clone()))
            .await;
        assert_eq!(navigation, Navigation::TimedOut { attempts: 30 });

        h.stripe.complete_session(&session_id, "pm_card_visa").await;
        assert!(matches!(h.pipeline.retry().await, Navigation::Completed(_)));
        assert_eq!(h.accounts.tenants_created(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_without_history_fails() {
        let h = harness();
        let Navigation::Failed(report) = h.pipeline.retry().await else {
            panic!("expected failure");
        };
        assert_eq!(report.kind, ErrorKind::RecoveryDataMissing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_from_return_url() {
        let h = harness();
        let Navigation::NavigateTo(url) = h.pipeline.begin(&form("US", "business", None)).await
        else {
            panic!("expected redirect");
        };
        let session_id = session_from(&url);
        let intent_id = h.pipeline.cache.load().await.unwrap().unwrap().intent_id;
        h.stripe.complete_session(&session_id, "pm_card_visa").await;

        let back = format!(
            "https://app.test/signup/confirm?intent_id={intent_id}&session_id={session_id}"
        );
        assert!(matches!(
            h.pipeline.resume_from_url(&back).await,
            Navigation::Completed(_)
        ));
    }

    #[test]
    fn test_return_params() {
        let (id, session) =
            return_params("https://app.test/confirm?intent_id=int_7&session_id=cs_9").unwrap();
        assert_eq!(id, IntentId::from_string("int_7"));
        assert_eq!(session.as_deref(), Some("cs_9"));

        assert!(return_params("https://app.test/confirm?session_id=cs_9").is_none());
        assert!(return_params("not a url").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_finalize_runs_once() {
        let mut scripted = ScriptedApi::new(vec![Ok(IntentStatus::PaidReady)]);
        scripted.finalize_delay = Duration::from_secs(1);
        let api = Arc::new(scripted);
        let storage = Arc::new(MemoryStorage::new());
        let cache = RecoveryCache::new(storage, chrono::Duration::hours(24));
        let id = IntentId::from_string("int_1");
        cache.save(&id, "s3cret-pass").await.unwrap();

        let pipeline = SignupPipeline::new(api.clone(), cache, PollerConfig::default(), urls());
        let (first, second) = tokio::join!(
            pipeline.resume(&id, None),
            pipeline.resume(&id, None)
        );

        let completed = [&first, &second]
            .iter()
            .filter(|n| matches!(n, Navigation::Completed(_)))
            .count();
        assert_eq!(completed, 1);
        assert!([&first, &second].iter().any(|n| matches!(
            n,
            Navigation::Failed(report) if report.kind == ErrorKind::Conflict
        )));
        assert_eq!(api.finalize_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_at_ceiling_is_failed() {
        let api = Arc::new(ScriptedApi::new(vec![Err(network())]));
        let cache = RecoveryCache::new(Arc::new(MemoryStorage::new()), chrono::Duration::hours(24));
        let id = IntentId::from_string("int_1");
        cache.save(&id, "s3cret-pass").await.unwrap();
        let pipeline = SignupPipeline::new(api, cache, PollerConfig::default(), urls());

        let Navigation::Failed(report) = pipeline.resume(&id, None).await else {
            panic!("expected failure");
        };
        assert_eq!(report.kind, ErrorKind::Network);
    }

    #[test]
    fn test_navigation_serializes_tagged() {
        let json = serde_json::to_value(Navigation::TimedOut { attempts: 30 }).unwrap();
        assert_eq!(json["action"], "timed_out");
        assert_eq!(json["payload"]["attempts"], 30);
    }
}
