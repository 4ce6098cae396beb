//! Server Configuration

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Which processors back the signup pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentsMode {
    /// Stripe and MercadoPago from their environment credentials
    Live,
    /// In-process mock processors; hosted checkouts complete on first poll
    Mock,
}

impl FromStr for PaymentsMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "mock" => Ok(Self::Mock),
            _ => Err(()),
        }
    }
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub payments_mode: PaymentsMode,
    /// Unfinalized intents idle longer than this are purged
    pub intent_ttl: chrono::Duration,
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".into(),
            payments_mode: PaymentsMode::Live,
            intent_ttl: chrono::Duration::hours(72),
            sweep_interval: Duration::from_secs(3600),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            payments_mode: env_var("SIGNUP_PAYMENTS_MODE")?.unwrap_or(defaults.payments_mode),
            intent_ttl: env_var("SIGNUP_INTENT_TTL_HOURS")?
                .and_then(chrono::Duration::try_hours)
                .unwrap_or(defaults.intent_ttl),
            sweep_interval: env_var::<u64>("SIGNUP_SWEEP_INTERVAL_SECS")?
                .filter(|secs| *secs > 0)
                .map_or(defaults.sweep_interval, Duration::from_secs),
        })
    }
}

fn env_var<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    parse_var(key, std::env::var(key).ok())
}

fn parse_var<T: FromStr>(key: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    match value {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
