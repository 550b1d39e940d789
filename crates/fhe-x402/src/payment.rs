use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use serde::{Deserialize, Serialize};

use crate::constants::{
    ProtocolConfig, DEFAULT_MAX_TIMEOUT_SECONDS, DEFAULT_MIME_TYPE, SCHEME_NAME, SECONDS_PER_DAY,
    X402_VERSION,
};
use crate::X402Error;

/// Opaque reference to a ciphertext stored on-chain (an `euint64` handle).
pub type CiphertextHandle = B256;

/// Output of the FHE capability's `encrypt`: the input handle plus the proof
/// the token contract needs to accept it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedAmount {
    pub handle: CiphertextHandle,
    pub proof: Bytes,
}

/// The 402 challenge body issued by a resource server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirement {
    pub scheme: String,
    pub network: String,
    pub chain_id: u64,
    pub pay_to: Address,
    /// Smallest-unit decimal string.
    pub max_amount_required: String,
    pub asset: Address,
    pub resource: String,
    pub description: String,
    pub mime_type: String,
    pub max_timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facilitator: Option<String>,
}

impl PaymentRequirement {
    /// Build the requirement a resource server issues for `resource`, taking
    /// payee, asset, chain and facilitator from `config`.
    pub fn for_resource(
        config: &ProtocolConfig,
        resource: &str,
        amount: &str,
        description: &str,
    ) -> Result<Self, X402Error> {
        let pay_to = config.merchant_address.ok_or_else(|| {
            X402Error::ConfigError("MERCHANT_ADDRESS must be set to issue requirements".into())
        })?;
        parse_amount(amount)?;

        Ok(Self {
            scheme: SCHEME_NAME.to_string(),
            network: config.network.clone(),
            chain_id: config.default_chain_id,
            pay_to,
            max_amount_required: amount.to_string(),
            asset: config.token_address,
            resource: resource.to_string(),
            description: description.to_string(),
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            max_timeout_seconds: DEFAULT_MAX_TIMEOUT_SECONDS,
            facilitator: Some(config.facilitator_base_url.clone()),
        })
    }

    /// `maxAmountRequired` as an integer amount.
    pub fn required_amount(&self) -> Result<U256, X402Error> {
        parse_amount(&self.max_amount_required)
    }

    /// Copy of this requirement bound to a different resource URL.
    pub fn with_resource(&self, resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            ..self.clone()
        }
    }
}

/// Parse a non-negative decimal integer amount (no sign, no fraction).
pub fn parse_amount(raw: &str) -> Result<U256, X402Error> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(X402Error::InvalidAmount(raw.to_string()));
    }
    U256::from_str_radix(raw, 10).map_err(|_| X402Error::InvalidAmount(raw.to_string()))
}

/// Time-bounded authorization to decrypt the user's ciphertexts for a set of
/// contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionSignature {
    pub signature: String,
    pub public_key: String,
    pub user_address: Address,
    pub contract_addresses: Vec<Address>,
    /// Unix seconds.
    pub start_timestamp: u64,
    pub duration_days: u32,
}

impl DecryptionSignature {
    /// First unix second at which the signature no longer authorizes anything.
    pub fn expires_at(&self) -> u64 {
        self.start_timestamp
            .saturating_add(u64::from(self.duration_days).saturating_mul(SECONDS_PER_DAY))
    }

    /// Whether `now` lies in `[start_timestamp, expires_at)`.
    pub fn is_valid_at(&self, now: u64) -> bool {
        now >= self.start_timestamp && now < self.expires_at()
    }

    /// Whether decryption of ciphertexts owned by `contract` is authorized at `now`.
    pub fn authorizes(&self, contract: Address, now: u64) -> bool {
        self.is_valid_at(now) && self.contract_addresses.contains(&contract)
    }
}

/// Inner payload: the transfer transaction and the authorization the
/// facilitator uses to decrypt its amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhePaymentData {
    pub tx_hash: TxHash,
    pub decryption_signature: DecryptionSignature,
}

/// Proof of payment sent by the client to the facilitator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u32,
    pub scheme: String,
    pub network: String,
    pub chain_id: u64,
    pub payload: FhePaymentData,
}

/// Body of `POST {facilitator}/verify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub x402_version: u32,
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirement,
}

impl VerifyRequest {
    pub fn new(payload: &PaymentPayload, requirement: &PaymentRequirement) -> Self {
        Self {
            x402_version: X402_VERSION,
            payment_payload: payload.clone(),
            payment_requirements: requirement.clone(),
        }
    }
}

/// Current unix time in seconds (0 if the clock is before the epoch).
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature(start: u64, days: u32) -> DecryptionSignature {
        DecryptionSignature {
            signature: "0xsig".to_string(),
            public_key: "0xpub".to_string(),
            user_address: Address::repeat_byte(0x01),
            contract_addresses: vec![Address::repeat_byte(0x02)],
            start_timestamp: start,
            duration_days: days,
        }
    }

    #[test]
    fn signature_window_is_half_open() {
        let sig = signature(1_000, 1);
        assert!(!sig.is_valid_at(999));
        assert!(sig.is_valid_at(1_000));
        assert!(sig.is_valid_at(1_000 + SECONDS_PER_DAY - 1));
        assert!(!sig.is_valid_at(1_000 + SECONDS_PER_DAY));
    }

    #[test]
    fn signature_only_authorizes_listed_contracts() {
        let sig = signature(1_000, 1);
        assert!(sig.authorizes(Address::repeat_byte(0x02), 2_000));
        assert!(!sig.authorizes(Address::repeat_byte(0x03), 2_000));
    }

    #[test]
    fn amount_must_be_plain_decimal() {
        assert_eq!(parse_amount("1000000").unwrap(), U256::from(1_000_000u64));
        assert_eq!(parse_amount("0").unwrap(), U256::ZERO);
        assert!(parse_amount("").is_err());
        assert!(parse_amount("-5").is_err());
        assert!(parse_amount("1.5").is_err());
        assert!(parse_amount("0x10").is_err());
    }

    #[test]
    fn for_resource_requires_merchant() {
        let err = PaymentRequirement::for_resource(
            &ProtocolConfig::default(),
            "/premium-data",
            "1000000",
            "Premium content access",
        )
        .unwrap_err();
        assert!(matches!(err, X402Error::ConfigError(_)));
    }

    #[test]
    fn for_resource_fills_protocol_defaults() {
        let config = ProtocolConfig::default().with_merchant(Address::repeat_byte(0xaa));
        let req = PaymentRequirement::for_resource(
            &config,
            "/premium-data",
            "1000000",
            "Premium content access",
        )
        .unwrap();
        assert_eq!(req.scheme, "fhe-transfer");
        assert_eq!(req.network, "sepolia");
        assert_eq!(req.chain_id, 11155111);
        assert_eq!(req.max_timeout_seconds, 300);
        assert_eq!(req.mime_type, "application/json");
        assert_eq!(req.facilitator.as_deref(), Some(config.facilitator_base_url.as_str()));
    }

    #[test]
    fn requirement_uses_wire_field_names() {
        let config = ProtocolConfig::default().with_merchant(Address::repeat_byte(0xaa));
        let req = PaymentRequirement::for_resource(&config, "/r", "5", "d").unwrap();
        let json = serde_json::to_value(&req).unwrap();
        for key in [
            "scheme",
            "network",
            "chainId",
            "payTo",
            "maxAmountRequired",
            "asset",
            "resource",
            "description",
            "mimeType",
            "maxTimeoutSeconds",
            "facilitator",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }
}
