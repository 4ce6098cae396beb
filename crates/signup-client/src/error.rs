//! Client Error Types

use chrono::{DateTime, Utc};
use signup_core::{ErrorKind, ErrorReport, IntentId};
use thiserror::Error;

/// Local recovery cache failures
///
/// An absent entry is not an error; `load` returns `Ok(None)` for it.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Entry present but not decodable
    #[error("Recovery entry unreadable: {0}")]
    Unreadable(String),

    /// Entry older than the retention window; it has been purged
    #[error("Recovery entry expired (saved {saved_at})")]
    Expired { saved_at: DateTime<Utc> },

    /// Backing storage failed
    #[error("Recovery storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    /// Normalize into the report shown to the user
    pub fn report(&self, intent_id: Option<&IntentId>) -> ErrorReport {
        let message = match self {
            Self::Expired { .. } => {
                "Your signup session expired. Please start the signup again."
            }
            Self::Unreadable(_) | Self::Io(_) => {
                "We could not restore your signup on this device. Please start the signup again."
            }
        };
        let report = ErrorReport::new(ErrorKind::RecoveryDataMissing, message);
        match intent_id {
            Some(id) => report.with_intent(id),
            None => report,
        }
    }
}
