//! Payment attempt states and the transition table the orchestrator enforces.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a single payment attempt.
///
/// ```text
/// idle -> requesting -> success
///              |
///              +-> payment_required -> [signing] -> [transferring] -> verifying
///                                                                      |
///                          requesting (with proof) <--------- valid ---+
/// ```
/// Every non-idle, non-terminal state may fall to `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    #[default]
    Idle,
    Requesting,
    PaymentRequired,
    Signing,
    Transferring,
    Verifying,
    Success,
    Error,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Idle => "idle",
            PaymentState::Requesting => "requesting",
            PaymentState::PaymentRequired => "payment_required",
            PaymentState::Signing => "signing",
            PaymentState::Transferring => "transferring",
            PaymentState::Verifying => "verifying",
            PaymentState::Success => "success",
            PaymentState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentState::Success | PaymentState::Error)
    }

    /// Whether a new attempt may start from this state.
    pub fn accepts_new_attempt(&self) -> bool {
        matches!(self, PaymentState::Idle) || self.is_terminal()
    }

    /// Transition table. `reset` to idle is not listed: it is always allowed.
    pub fn can_transition_to(&self, next: PaymentState) -> bool {
        use PaymentState::*;
        match (self, next) {
            (Idle, Requesting) => true,
            (Requesting, Success | PaymentRequired) => true,
            (PaymentRequired, Signing | Transferring | Verifying) => true,
            (Signing, Transferring | Verifying) => true,
            (Transferring, Verifying) => true,
            (Verifying, Requesting) => true,
            (Requesting | PaymentRequired | Signing | Transferring | Verifying, Error) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
