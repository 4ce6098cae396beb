//! Intent status state machine and transition validation.
//!
//! The same table is used by the server (persisted status) and by the client
//! (local mirror that can additionally sit in `Timeout`).

use serde::{Deserialize, Serialize};

use crate::error::{Result, SignupError};

/// Signup intent status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentStatus {
    /// Intent recorded, no processor interaction yet
    Created,
    /// Processor-side setup/checkout object exists, awaiting confirmation
    CheckoutCreated,
    /// Payment method captured, ready to finalize
    PaidReady,
    /// Tenant created and linked
    Finalized,
    /// Poll ceiling exceeded (local signal, never persisted)
    Timeout,
    /// Unrecoverable failure
    Error,
}

impl IntentStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::CheckoutCreated => "CHECKOUT_CREATED",
            Self::PaidReady => "PAID_READY",
            Self::Finalized => "FINALIZED",
            Self::Timeout => "TIMEOUT",
            Self::Error => "ERROR",
        }
    }

    /// States the pipeline is still progressing through
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Created | Self::CheckoutCreated | Self::PaidReady)
    }

    /// `Timeout` and `Error` exits, recoverable by a user-triggered re-poll
    pub const fn is_exit(self) -> bool {
        matches!(self, Self::Timeout | Self::Error)
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates if a status transition is allowed by the state machine.
///
/// | From                | To                                   |
/// |---------------------|--------------------------------------|
/// | Created             | CheckoutCreated, PaidReady           |
/// | Created             | Finalized (free-trial intents only)  |
/// | CheckoutCreated     | PaidReady                            |
/// | PaidReady           | Finalized                            |
/// | any live state      | Timeout, Error                       |
/// | Timeout, Error      | any later status on re-poll          |
/// | Timeout <-> Error   | yes                                  |
/// | Finalized           | nothing                              |
/// | *any*               | same status (idempotent)             |
///
/// The free-trial guard on `Created -> Finalized` needs the intent itself and
/// is enforced by [`crate::Intent`].
pub fn validate_transition(from: IntentStatus, to: IntentStatus) -> Result<()> {
    if from == to || allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(SignupError::InvalidTransition { from, to })
    }
}

/// Returns all valid target statuses for a given current status.
pub const fn allowed_transitions(status: IntentStatus) -> &'static [IntentStatus] {
    use IntentStatus::{CheckoutCreated, Created, Error, Finalized, PaidReady, Timeout};

    match status {
        Created => &[CheckoutCreated, PaidReady, Finalized, Timeout, Error],
        CheckoutCreated => &[PaidReady, Timeout, Error],
        PaidReady => &[Finalized, Timeout, Error],
        Timeout => &[CheckoutCreated, PaidReady, Finalized, Error],
        Error => &[CheckoutCreated, PaidReady, Finalized, Timeout],
        Finalized => &[],
    }
}

/// Boolean form of [`validate_transition`].
pub fn can_transition(from: IntentStatus, to: IntentStatus) -> bool {
    validate_transition(from, to).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use IntentStatus::*;

    #[test]
    fn test_forward_path() {
        assert!(can_transition(Created, CheckoutCreated));
        assert!(can_transition(CheckoutCreated, PaidReady));
        assert!(can_transition(PaidReady, Finalized));
        assert!(can_transition(Created, PaidReady));
    }

    #[test]
    fn test_no_backwards_moves() {
        assert!(!can_transition(PaidReady, CheckoutCreated));
        assert!(!can_transition(CheckoutCreated, Created));
        assert!(!can_transition(CheckoutCreated, Finalized));
    }

    #[test]
    fn test_finalized_is_terminal() {
        for to in [Created, CheckoutCreated, PaidReady, Timeout, Error] {
            assert!(!can_transition(Finalized, to), "FINALIZED -> {to}");
        }
        assert!(can_transition(Finalized, Finalized));
    }

    #[test]
    fn test_exits_resume_persisted_status() {
        assert!(can_transition(Timeout, CheckoutCreated));
        assert!(can_transition(Error, PaidReady));
        assert!(can_transition(Timeout, Error));
    }

    #[test]
    fn test_exits_never_reopen_created() {
        assert!(!can_transition(Timeout, Created));
        assert!(!can_transition(Error, Created));
    }

    #[test]
    fn test_rejection_names_both_states() {
        let err = validate_transition(PaidReady, Created).unwrap_err();
        assert_eq!(err.to_string(), "Invalid status transition: PAID_READY -> CREATED");
    }

    #[test]
    fn test_wire_format() {
        assert_eq!(serde_json::to_string(&CheckoutCreated).unwrap(), "\"CHECKOUT_CREATED\"");
        let parsed: IntentStatus = serde_json::from_str("\"PAID_READY\"").unwrap();
        assert_eq!(parsed, PaidReady);
    }
}
