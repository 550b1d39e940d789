use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// Reason used when a facilitator rejects a payment without saying why.
pub const UNKNOWN_VERIFICATION_FAILURE: &str = "Payment verification failed";

/// Verdict returned by the facilitator's `/verify` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerifyResult {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Transferred amount in smallest units, as a decimal string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
}

impl PaymentVerifyResult {
    pub fn valid(tx_hash: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
            tx_hash: Some(tx_hash.into()),
            amount: Some(amount.into()),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason.into()),
            tx_hash: None,
            amount: None,
        }
    }

    /// The rejection reason, treating a missing or blank one as an unknown failure.
    pub fn reason_or_unknown(&self) -> &str {
        self.invalid_reason
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or(UNKNOWN_VERIFICATION_FAILURE)
    }
}

/// A token accepted on a supported network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedToken {
    pub address: Address,
    pub symbol: String,
    pub name: String,
}

/// One `{network, chainId, tokens}` tuple of the discovery document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedNetwork {
    pub network: String,
    pub chain_id: u64,
    pub tokens: Vec<SupportedToken>,
}

/// Response of `GET /supported`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedResponse {
    pub supported: Vec<SupportedNetwork>,
}

impl SupportedResponse {
    /// Whether `token` is accepted on `chain_id`.
    pub fn accepts(&self, chain_id: u64, token: Address) -> bool {
        self.supported
            .iter()
            .filter(|n| n.chain_id == chain_id)
            .any(|n| n.tokens.iter().any(|t| t.address == token))
    }
}

/// Status document returned by `GET /health`. Fields beyond `status` are
/// service specific and kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl HealthStatus {
    pub fn ok(service: &str) -> Self {
        let mut details = serde_json::Map::new();
        details.insert("service".to_string(), service.into());
        Self {
            status: "ok".to_string(),
            details,
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
