//! Abandoned-intent sweeper
//!
//! Intents that never finalize are dropped once idle for the retention
//! period; their ids then answer `IntentNotFound`.

use std::sync::Arc;
use std::time::Duration;

use signup_core::SignupService;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Run `purge_abandoned` every `interval` until the task is aborted
pub fn spawn_sweeper(
    service: Arc<SignupService>,
    ttl: chrono::Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match service.purge_abandoned(ttl).await {
                Ok(purged) => tracing::debug!(purged, "Intent sweep finished"),
                Err(e) => tracing::error!("Intent sweep failed: {}", e),
            }
        }
    })
}
