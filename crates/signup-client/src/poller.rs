//! Confirmation Poller
//!
//! Polls intent status after the user returns from a hosted checkout until
//! the intent is paid, the local attempt ceiling is hit, or the server
//! reports a hard failure.

use std::sync::Arc;
use std::time::Duration;

use signup_core::{ErrorKind, ErrorReport, IntentId, IntentStatus};
use tokio::time::{Instant, MissedTickBehavior};

use crate::api::SignupApi;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Polling cadence
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl PollerConfig {
    /// Read `SIGNUP_POLL_INTERVAL_MS` and `SIGNUP_POLL_MAX_ATTEMPTS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let interval = std::env::var("SIGNUP_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map_or(defaults.interval, Duration::from_millis);
        let max_attempts = std::env::var("SIGNUP_POLL_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_attempts);
        Self {
            interval,
            max_attempts,
        }
    }
}

/// Local polling position for one intent
///
/// The attempt counter lives only on the client; a retry resets it and
/// nothing else.
#[derive(Clone, Debug)]
pub struct PollCursor {
    intent_id: IntentId,
    session_id: Option<String>,
    attempts: u32,
    restart: bool,
}

impl PollCursor {
    pub const fn new(intent_id: IntentId, session_id: Option<String>) -> Self {
        Self {
            intent_id,
            session_id,
            attempts: 0,
            restart: false,
        }
    }

    pub const fn intent_id(&self) -> &IntentId {
        &self.intent_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Start counting again; the next poll asks the server to restart too
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.restart = true;
    }
}

/// How a polling run ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// Payment authorized; ready to finalize
    Ready,
    /// Finalized by an earlier call
    Finalized,
    /// Attempt ceiling reached while still pending
    TimedOut { attempts: u32 },
    /// Server reported a failure the user has to act on
    Failed(ErrorReport),
}

/// Drives status polls on a fixed interval
pub struct ConfirmationPoller {
    api: Arc<dyn SignupApi>,
    config: PollerConfig,
}

impl ConfirmationPoller {
    pub fn new(api: Arc<dyn SignupApi>, config: PollerConfig) -> Self {
        Self { api, config }
    }

    pub const fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Poll until a terminal outcome
    ///
    /// Transport failures and concurrent-update conflicts consume an attempt
    /// and are otherwise skipped. If the last attempt before the ceiling
    /// failed in transport, the run ends in `Failed` with that report rather
    /// than `TimedOut`.
    pub async fn run(&self, cursor: &mut PollCursor) -> PollOutcome {
        let period = self.config.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_transport_error: Option<ErrorReport> = None;

        while cursor.attempts < self.config.max_attempts {
            ticker.tick().await;
            cursor.attempts += 1;
            let restart = std::mem::take(&mut cursor.restart);

            let step = match self.api.get_intent_status(&cursor.intent_id, restart).await {
                Ok(status) => self.on_status(cursor, status.status).await,
                Err(report) => Err(report),
            };

            match step {
                Ok(Some(outcome)) => return outcome,
                Ok(None) => last_transport_error = None,
                Err(report) if report.is_transient() => {
                    tracing::debug!(
                        intent_id = %cursor.intent_id,
                        attempt = cursor.attempts,
                        "Status poll skipped: {}",
                        report
                    );
                    last_transport_error = Some(report);
                }
                Err(report) if report.kind == ErrorKind::Conflict => {
                    // Another confirmation landed first; read its result next tick.
                    tracing::debug!(
                        intent_id = %cursor.intent_id,
                        attempt = cursor.attempts,
                        "Status poll raced a concurrent update"
                    );
                    last_transport_error = None;
                }
                Err(report) => return PollOutcome::Failed(report),
            }
        }

        match last_transport_error {
            Some(report) => PollOutcome::Failed(report),
            None => {
                tracing::info!(
                    intent_id = %cursor.intent_id,
                    attempts = cursor.attempts,
                    "Confirmation polling timed out"
                );
                PollOutcome::TimedOut {
                    attempts: cursor.attempts,
                }
            }
        }
    }

    /// `Ok(None)` keeps polling
    async fn on_status(
        &self,
        cursor: &PollCursor,
        status: IntentStatus,
    ) -> Result<Option<PollOutcome>, ErrorReport> {
        match status {
            IntentStatus::PaidReady => Ok(Some(PollOutcome::Ready)),
            IntentStatus::Finalized => Ok(Some(PollOutcome::Finalized)),
            IntentStatus::Error => Ok(Some(PollOutcome::Failed(payment_failed(
                &cursor.intent_id,
            )))),
            IntentStatus::CheckoutCreated => {
                let Some(session_id) = cursor.session_id() else {
                    return Ok(None);
                };
                let confirmed = self
                    .api
                    .mark_intent_ready(&cursor.intent_id, Some(session_id))
                    .await?;
                match confirmed.status {
                    IntentStatus::PaidReady => Ok(Some(PollOutcome::Ready)),
                    IntentStatus::Error => Ok(Some(PollOutcome::Failed(payment_failed(
                        &cursor.intent_id,
                    )))),
                    _ => Ok(None),
                }
            }
            IntentStatus::Created | IntentStatus::Timeout => Ok(None),
        }
    }
}

fn payment_failed(intent_id: &IntentId) -> ErrorReport {
    ErrorReport::new(
        ErrorKind::Provider,
        "The payment could not be confirmed. Please start checkout again.",
    )
    .with_intent(intent_id)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use signup_core::api::{
        CardSummary, CreateIntentRequest, CreateIntentResponse, CreateSetupRequest,
        CreateSetupResponse, FinalizeResponse, IntentStatusResponse, SavePaymentMethodRequest,
        StartCheckoutRequest, StartCheckoutResponse,
    };
    use signup_core::{Company, CompanyId};
    use tokio::sync::Mutex;

    use super::*;

    /// Status replies played back in order; the last one repeats
    pub(crate) struct ScriptedApi {
        statuses: Mutex<VecDeque<Result<IntentStatus, ErrorReport>>>,
        ready: Mutex<VecDeque<Result<IntentStatus, ErrorReport>>>,
        pub(crate) status_calls: AtomicUsize,
        pub(crate) ready_calls: AtomicUsize,
        pub(crate) finalize_calls: AtomicUsize,
        pub(crate) restarts: AtomicUsize,
        pub(crate) finalize_delay: Duration,
    }

    impl ScriptedApi {
        pub(crate) fn new(statuses: Vec<Result<IntentStatus, ErrorReport>>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                ready: Mutex::new(VecDeque::new()),
                status_calls: AtomicUsize::new(0),
                ready_calls: AtomicUsize::new(0),
                finalize_calls: AtomicUsize::new(0),
                restarts: AtomicUsize::new(0),
                finalize_delay: Duration::ZERO,
            }
        }

        pub(crate) fn with_ready(self, replies: Vec<Result<IntentStatus, ErrorReport>>) -> Self {
            Self {
                ready: Mutex::new(replies.into()),
                ..self
            }
        }

        async fn next(
            queue: &Mutex<VecDeque<Result<IntentStatus, ErrorReport>>>,
        ) -> Result<IntentStatus, ErrorReport> {
            let mut queue = queue.lock().await;
            if queue.len() > 1 {
                queue.pop_front().unwrap_or(Ok(IntentStatus::CheckoutCreated))
            } else {
                queue
                    .front()
                    .cloned()
                    .unwrap_or(Ok(IntentStatus::CheckoutCreated))
            }
        }
    }

    pub(crate) fn network() -> ErrorReport {
        ErrorReport::new(ErrorKind::Network, "We could not reach the server.")
    }

    #[async_trait]
    impl SignupApi for ScriptedApi {
        async fn create_setup(
            &self,
            _req: &CreateSetupRequest,
        ) -> Result<CreateSetupResponse, ErrorReport> {
            Ok(CreateSetupResponse {
                client_secret: "seti_scripted_secret".into(),
            })
        }

        async fn save_payment_method(
            &self,
            _req: &SavePaymentMethodRequest,
        ) -> Result<CardSummary, ErrorReport> {
            Ok(CardSummary {
                last4: "4242".into(),
                brand: "visa".into(),
            })
        }

        async fn create_intent(
            &self,
            _req: &CreateIntentRequest,
        ) -> Result<CreateIntentResponse, ErrorReport> {
            Err(ErrorReport::new(ErrorKind::Unknown, "not scripted"))
        }

        async fn start_checkout(
            &self,
            _id: &IntentId,
            _req: &StartCheckoutRequest,
        ) -> Result<StartCheckoutResponse, ErrorReport> {
            Err(ErrorReport::new(ErrorKind::Unknown, "not scripted"))
        }

        async fn get_intent_status(
            &self,
            id: &IntentId,
            restart: bool,
        ) -> Result<IntentStatusResponse, ErrorReport> {
            let attempts = self.status_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if restart {
                self.restarts.fetch_add(1, Ordering::SeqCst);
            }
            let status = Self::next(&self.statuses).await?;
            Ok(IntentStatusResponse {
                intent_id: id.clone(),
                status,
                attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
            })
        }

        async fn mark_intent_ready(
            &self,
            id: &IntentId,
            _external_session_id: Option<&str>,
        ) -> Result<IntentStatusResponse, ErrorReport> {
            self.ready_calls.fetch_add(1, Ordering::SeqCst);
            let status = Self::next(&self.ready).await?;
            Ok(IntentStatusResponse {
                intent_id: id.clone(),
                status,
                attempts: 0,
            })
        }

        async fn finalize_signup(
            &self,
            id: &IntentId,
            _password: &str,
        ) -> Result<FinalizeResponse, ErrorReport> {
            let previous = self.finalize_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.finalize_delay).await;
            Ok(FinalizeResponse {
                company: Company {
                    id: CompanyId::from_string(format!("co_{id}")),
                    name: "Acme".into(),
                    plan_id: "business".into(),
                    modules: Default::default(),
                    owner_user_id: "usr_1".into(),
                    owner_email: "owner@acme.test".into(),
                    created_at: chrono::Utc::now(),
                },
                created: previous == 0,
            })
        }
    }

    fn poller(api: &Arc<ScriptedApi>) -> ConfirmationPoller {
        ConfirmationPoller::new(api.clone(), PollerConfig::default())
    }

    fn cursor(session: Option<&str>) -> PollCursor {
        PollCursor::new(IntentId::from_string("int_1"), session.map(str::to_string))
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_thirty_polls() {
        let api = Arc::new(ScriptedApi::new(vec![Ok(IntentStatus::CheckoutCreated)]));
        let started = Instant::now();

        let mut cursor = cursor(None);
        let outcome = poller(&api).run(&mut cursor).await;

        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 30 });
        assert_eq!(api.status_calls.load(Ordering::SeqCst), 30);
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_a_few_polls() {
        let api = Arc::new(ScriptedApi::new(vec![
            Ok(IntentStatus::CheckoutCreated),
            Ok(IntentStatus::CheckoutCreated),
            Ok(IntentStatus::PaidReady),
        ]));
        let mut cursor = cursor(None);

        assert_eq!(poller(&api).run(&mut cursor).await, PollOutcome::Ready);
        assert_eq!(cursor.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_errors_count_but_do_not_fail() {
        let api = Arc::new(ScriptedApi::new(vec![
            Err(network()),
            Err(network()),
            Ok(IntentStatus::PaidReady),
        ]));
        let mut cursor = cursor(None);

        assert_eq!(poller(&api).run(&mut cursor).await, PollOutcome::Ready);
        assert_eq!(cursor.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_network_failure_surfaces_at_ceiling() {
        let api = Arc::new(ScriptedApi::new(vec![Err(network())]));
        let mut cursor = cursor(None);

        match poller(&api).run(&mut cursor).await {
            PollOutcome::Failed(report) => assert_eq!(report.kind, ErrorKind::Network),
            other => panic!("expected network failure, got {other:?}"),
        }
        assert_eq!(api.status_calls.load(Ordering::SeqCst), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_error_stops_immediately() {
        let gone = ErrorReport::new(ErrorKind::IntentNotFound, "This signup could not be found.");
        let api = Arc::new(ScriptedApi::new(vec![Err(gone.clone())]));
        let mut cursor = cursor(None);

        assert_eq!(poller(&api).run(&mut cursor).await, PollOutcome::Failed(gone));
        assert_eq!(cursor.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflicting_confirmation_is_skipped() {
        let conflict = ErrorReport::new(
            ErrorKind::Conflict,
            "This signup is in a different state than expected. Please retry.",
        );
        let api = Arc::new(
            ScriptedApi::new(vec![
                Ok(IntentStatus::CheckoutCreated),
                Ok(IntentStatus::PaidReady),
            ])
            .with_ready(vec![Err(conflict)]),
        );
        let mut cursor = cursor(Some("cs_1"));

        assert_eq!(poller(&api).run(&mut cursor).await, PollOutcome::Ready);
        assert_eq!(cursor.attempts(), 2);
        assert_eq!(api.ready_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirms_hosted_session() {
        let api = Arc::new(
            ScriptedApi::new(vec![Ok(IntentStatus::CheckoutCreated)]).with_ready(vec![
                Ok(IntentStatus::CheckoutCreated),
                Ok(IntentStatus::PaidReady),
            ]),
        );
        let mut cursor = cursor(Some("cs_1"));

        assert_eq!(poller(&api).run(&mut cursor).await, PollOutcome::Ready);
        assert_eq!(api.ready_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session_fails() {
        let api = Arc::new(
            ScriptedApi::new(vec![Ok(IntentStatus::CheckoutCreated)])
                .with_ready(vec![Ok(IntentStatus::Error)]),
        );
        let mut cursor = cursor(Some("cs_1"));

        match poller(&api).run(&mut cursor).await {
            PollOutcome::Failed(report) => {
                assert_eq!(report.kind, ErrorKind::Provider);
                assert_eq!(report.intent_id, Some(IntentId::from_string("int_1")));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restarts_local_counter_only() {
        let api = Arc::new(ScriptedApi::new(vec![Ok(IntentStatus::CheckoutCreated)]));
        let poller = poller(&api);
        let mut cursor = cursor(None);

        assert_eq!(
            poller.run(&mut cursor).await,
            PollOutcome::TimedOut { attempts: 30 }
        );
        cursor.reset();
        assert_eq!(cursor.attempts(), 0);

        assert_eq!(
            poller.run(&mut cursor).await,
            PollOutcome::TimedOut { attempts: 30 }
        );
        assert_eq!(api.status_calls.load(Ordering::SeqCst), 60);
        assert_eq!(api.restarts.load(Ordering::SeqCst), 1);
    }
}
