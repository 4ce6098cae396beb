//! Error Types

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::intent::IntentId;
use crate::status::IntentStatus;

/// Result type alias for signup operations
pub type Result<T> = std::result::Result<T, SignupError>;

/// Signup pipeline error types
#[derive(Error, Debug)]
pub enum SignupError {
    /// Required signup fields missing or malformed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Payment processor declined or rejected the payment method
    #[error("Provider error: {0}")]
    Provider(String),

    /// Transient transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Unknown or expired intent id
    #[error("Intent not found: {0}")]
    IntentNotFound(IntentId),

    /// Local poll ceiling exceeded
    #[error("Confirmation timed out after {attempts} attempts")]
    Timeout { attempts: u32 },

    /// Transition not allowed by the intent state machine
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: IntentStatus, to: IntentStatus },

    /// Intent changed underneath an update
    #[error("Concurrent update on intent {0}")]
    Conflict(IntentId),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure that could not be classified
    #[error("{0}")]
    Unknown(String),
}

impl SignupError {
    /// Check if error is retryable without user intervention
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Conflict(_) | Self::Storage(_)
        )
    }

    /// Tag used when the error crosses the API boundary
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Provider(_) => ErrorKind::Provider,
            Self::Network(_) => ErrorKind::Network,
            Self::IntentNotFound(_) => ErrorKind::IntentNotFound,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Config(_) => ErrorKind::Config,
            Self::Storage(_) | Self::Json(_) | Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            // Processor messages are shown verbatim so the user can pick another card.
            Self::Validation(msg) | Self::Provider(msg) => msg.clone(),
            Self::Network(_) => "We could not reach the server. Please try again.".into(),
            Self::IntentNotFound(_) => {
                "This signup could not be found or has expired. Please start again.".into()
            }
            Self::Timeout { .. } => {
                "Payment confirmation is taking longer than expected. You can retry.".into()
            }
            Self::InvalidTransition { .. } | Self::Conflict(_) => {
                "This signup is in a different state than expected. Please retry.".into()
            }
            Self::Config(_) => "Payments are not available right now.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }

    /// Normalize into the single shape exposed to callers
    pub fn report(&self, intent_id: Option<&IntentId>) -> ErrorReport {
        let intent_id = match self {
            Self::IntentNotFound(id) => Some(id.clone()),
            _ => intent_id.cloned(),
        };
        ErrorReport {
            kind: self.kind(),
            message: self.user_message(),
            intent_id,
        }
    }
}

/// Error category carried across the API boundary
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Provider,
    Network,
    IntentNotFound,
    Timeout,
    InvalidTransition,
    Conflict,
    Config,
    /// Confirmation page reached without the locally cached signup data
    RecoveryDataMissing,
    Unknown,
}

/// Normalized `{message, intent_id?}` error shape
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_id: Option<IntentId>,
}

impl ErrorReport {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            intent_id: None,
        }
    }

    #[must_use]
    pub fn with_intent(mut self, intent_id: &IntentId) -> Self {
        self.intent_id = Some(intent_id.clone());
        self
    }

    /// Transient failures are retried silently by the poller
    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Network
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_message_is_verbatim() {
        let err = SignupError::Provider("Your card was declined.".into());
        assert_eq!(err.user_message(), "Your card was declined.");
        assert_eq!(err.kind(), ErrorKind::Provider);
    }

    #[test]
    fn test_report_keeps_intent_id_for_unknown_errors() {
        let id = IntentId::from_string("int_abc");
        let report = SignupError::Unknown("boom".into()).report(Some(&id));
        assert_eq!(report.kind, ErrorKind::Unknown);
        assert_eq!(report.intent_id, Some(id));
    }

    #[test]
    fn test_not_found_report_uses_own_id() {
        let id = IntentId::from_string("int_missing");
        let report = SignupError::IntentNotFound(id.clone()).report(None);
        assert_eq!(report.intent_id, Some(id));
    }

    #[test]
    fn test_report_wire_shape() {
        let report = ErrorReport::new(ErrorKind::IntentNotFound, "gone");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "intent_not_found");
        assert!(json.get("intent_id").is_none());
    }

    #[test]
    fn test_retryable() {
        assert!(SignupError::Network("reset".into()).is_retryable());
        assert!(!SignupError::Validation("email".into()).is_retryable());
    }
}
