use thiserror::Error;

use crate::PaymentState;

/// Errors returned by x402 operations.
///
/// Protocol-layer outcomes (an unrecognised 402, a rejected verification,
/// an unreachable facilitator) are normally carried as data; the matching
/// variants exist so callers can name them when converting.
#[derive(Debug, Error)]
pub enum X402Error {
    #[error("payment required but no requirement provided")]
    ChallengeParse,

    #[error("decryption signature required")]
    SignatureRequired,

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("transfer failed: {0}")]
    TransferFailed(String),

    #[error("payment verification rejected: {0}")]
    VerificationRejected(String),

    #[error("facilitator unreachable: {0}")]
    FacilitatorUnreachable(String),

    #[error("a payment attempt is already in progress (state: {0})")]
    AlreadyInProgress(PaymentState),

    #[error("invalid payment state transition: {from} -> {to}")]
    InvalidTransition { from: PaymentState, to: PaymentState },

    #[error("invalid amount '{0}': expected a non-negative integer")]
    InvalidAmount(String),

    #[error("chain error: {0}")]
    ChainError(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("http error: {0}")]
    HttpError(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
