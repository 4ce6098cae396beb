//! Payment Error Types

use signup_core::SignupError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment processor errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Processor declined or rejected the request
    #[error("{provider} rejected the request: {message}")]
    Rejected {
        provider: &'static str,
        message: String,
    },

    /// Processor unreachable, timed out, or failing server-side
    #[error("{provider} unavailable: {message}")]
    Unavailable {
        provider: &'static str,
        message: String,
    },

    /// Processor answered with something we could not interpret
    #[error("Unexpected {provider} response: {message}")]
    UnexpectedResponse {
        provider: &'static str,
        message: String,
    },

    /// Malformed payment method or session reference
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected { message, .. } => message.clone(),
            Self::Unavailable { .. } => {
                "The payment processor is not responding. Please try again.".into()
            }
            Self::InvalidReference(_) => "The payment details are invalid.".into(),
            Self::Config(_) => "Service configuration error.".into(),
            _ => "An error occurred processing your payment.".into(),
        }
    }
}

impl From<PaymentError> for SignupError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Rejected { message, .. } => Self::Provider(message),
            PaymentError::Unavailable { .. } => Self::Network(err.to_string()),
            PaymentError::InvalidReference(_)
            | PaymentError::WebhookSignature(_)
            | PaymentError::WebhookParse(_) => Self::Validation(err.to_string()),
            PaymentError::Config(msg) => Self::Config(msg),
            PaymentError::UnexpectedResponse { .. } => Self::Unknown(err.to_string()),
        }
    }
}
