//! Secret comparison for operator endpoints (`/metrics` bearer tokens).

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Compare two secrets without leaking content or length through timing:
/// both sides are hashed to SHA-256 before a constant-time comparison.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    Sha256::digest(a).ct_eq(&Sha256::digest(b)).into()
}

/// Whether an `Authorization` header value carries `Bearer <expected>`.
pub fn bearer_matches(authorization: Option<&str>, expected: &[u8]) -> bool {
    authorization
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| constant_time_eq(token.trim().as_bytes(), expected))
        .unwrap_or(false)
}

/// Parse a boolean opt-in flag such as `X402_PUBLIC_METRICS`.
pub fn env_flag(value: Option<&str>) -> bool {
    matches!(value.map(str::trim), Some("true" | "1"))
}
