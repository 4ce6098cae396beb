//! Tenant Signup HTTP Server
//!
//! Axum-based server exposing the signup provisioning pipeline: intent
//! creation, payment capture through Stripe or MercadoPago, status polling
//! and idempotent tenant finalization.

mod config;
mod handlers;
mod routes;
mod state;
mod sweeper;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::routes::router;
use crate::state::AppState;
use crate::sweeper::spawn_sweeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env()?;
    let state = AppState::from_config(&config);

    let plans = state.service.plans();
    tracing::info!("Loaded {} plans", plans.len());

    let sweeper = spawn_sweeper(
        state.service.clone(),
        config.intent_ttl,
        config.sweep_interval,
    );
    tracing::info!(
        ttl_hours = config.intent_ttl.num_hours(),
        every_secs = config.sweep_interval.as_secs(),
        "Abandoned-intent sweeper started"
    );

    let app = router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 signup server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                              - Health check");
    tracing::info!("  POST /api/signup/setup                    - Create card setup");
    tracing::info!("  POST /api/signup/payment-method           - Save payment method");
    tracing::info!("  POST /api/signup/intents                  - Create signup intent");
    tracing::info!("  POST /api/signup/intents/{{id}}/checkout    - Start checkout");
    tracing::info!("  GET  /api/signup/intents/{{id}}/status      - Poll intent status");
    tracing::info!("  POST /api/signup/intents/{{id}}/ready       - Confirm hosted checkout");
    tracing::info!("  POST /api/signup/intents/{{id}}/finalize    - Create tenant");
    tracing::info!("  POST /webhook/stripe                      - Stripe webhook");
    tracing::info!("");

    axum::serve(listener, app).await?;

    sweeper.abort();
    Ok(())
}
