//! Encoding and decoding of the 402 challenge and the payment proof.
//!
//! Parsing is deliberately forgiving: anything that is not a well-formed
//! `fhe-transfer` challenge yields `None`, so a 402 from another protocol is
//! handed back to the caller untouched.

use alloy::primitives::TxHash;
use base64::Engine;

use crate::constants::{SCHEME_NAME, X402_VERSION};
use crate::payment::{
    parse_amount, DecryptionSignature, FhePaymentData, PaymentPayload, PaymentRequirement,
};
use crate::X402Error;

/// HTTP status of a payment challenge.
pub const PAYMENT_REQUIRED_STATUS: u16 = 402;

/// Whether a `Content-Type` value denotes JSON.
pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(false)
}

/// Parse a 402 challenge. Returns `None` unless the status is 402, the body is
/// JSON, its `scheme` is `fhe-transfer` and the requirement is well formed.
pub fn parse_challenge(
    http_status: u16,
    body: &[u8],
    content_type: Option<&str>,
) -> Option<PaymentRequirement> {
    if http_status != PAYMENT_REQUIRED_STATUS {
        return None;
    }
    if !is_json_content_type(content_type) {
        tracing::warn!(content_type = ?content_type, "402 response is not JSON");
        return None;
    }

    let value: serde_json::Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "failed to parse 402 body");
            return None;
        }
    };

    let scheme = value.get("scheme").and_then(|s| s.as_str());
    if scheme != Some(SCHEME_NAME) {
        tracing::debug!(scheme = ?scheme, "402 challenge uses a foreign scheme");
        return None;
    }

    let requirement: PaymentRequirement = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "malformed fhe-transfer requirement");
            return None;
        }
    };

    if let Err(e) = parse_amount(&requirement.max_amount_required) {
        tracing::warn!(error = %e, "fhe-transfer requirement has an unusable amount");
        return None;
    }

    Some(requirement)
}

/// Serialize a challenge body, forcing the `scheme` tag to `fhe-transfer`.
/// Served as the whole body of a 402 with `Content-Type: application/json`.
pub fn build_challenge(fields: &PaymentRequirement) -> Result<Vec<u8>, X402Error> {
    let mut value = serde_json::to_value(fields)?;
    if let Some(object) = value.as_object_mut() {
        object.insert("scheme".to_string(), SCHEME_NAME.into());
    }
    Ok(serde_json::to_vec(&value)?)
}

/// Build the proof of payment for `requirement`. Version is pinned to 1 and
/// the protocol identity (scheme, network, chain) is copied from the requirement.
pub fn build_payload(
    requirement: &PaymentRequirement,
    tx_hash: TxHash,
    decryption_signature: DecryptionSignature,
) -> PaymentPayload {
    PaymentPayload {
        x402_version: X402_VERSION,
        scheme: requirement.scheme.clone(),
        network: requirement.network.clone(),
        chain_id: requirement.chain_id,
        payload: FhePaymentData {
            tx_hash,
            decryption_signature,
        },
    }
}

/// Base64-encode a payment payload for the `X-Payment-Payload` header.
pub fn encode_payload_header(payload: &PaymentPayload) -> Result<String, X402Error> {
    let json = serde_json::to_vec(payload)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(json))
}

/// Decode the `X-Payment-Payload` header.
pub fn decode_payload_header(encoded: &str) -> Result<PaymentPayload, X402Error> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| X402Error::HttpError(format!("invalid base64 payment payload: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| X402Error::HttpError(format!("invalid JSON payment payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ProtocolConfig;
    use alloy::primitives::{Address, B256};

    const JSON: Option<&str> = Some("application/json; charset=utf-8");

    fn requirement() -> PaymentRequirement {
        let config = ProtocolConfig::default().with_merchant(Address::repeat_byte(0xaa));
        PaymentRequirement::for_resource(
            &config,
            "/premium-data",
            "1000000",
            "Premium content access",
        )
        .unwrap()
    }

    fn signature() -> DecryptionSignature {
        DecryptionSignature {
            signature: "0x01".to_string(),
            public_key: "0x02".to_string(),
            user_address: Address::repeat_byte(0x01),
            contract_addresses: vec![Address::repeat_byte(0x02)],
            start_timestamp: 0,
            duration_days: 1,
        }
    }

    #[test]
    fn challenge_round_trips_through_http_shape() {
        let req = requirement();
        let body = build_challenge(&req).unwrap();
        assert_eq!(parse_challenge(402, &body, JSON), Some(req));
    }

    #[test]
    fn build_challenge_overrides_scheme() {
        let mut req = requirement();
        req.scheme = "exact".to_string();
        let body: serde_json::Value =
            serde_json::from_slice(&build_challenge(&req).unwrap()).unwrap();
        assert_eq!(body["scheme"], "fhe-transfer");
    }

    #[test]
    fn non_402_is_not_a_challenge() {
        let body = build_challenge(&requirement()).unwrap();
        assert!(parse_challenge(200, &body, JSON).is_none());
        assert!(parse_challenge(401, &body, JSON).is_none());
    }

    #[test]
    fn foreign_or_malformed_402_yields_none() {
        let cases: Vec<(&[u8], Option<&str>)> = vec![
            (&br#"{"scheme":"exact","network":"base"}"#[..], JSON),
            (&br#"{"network":"sepolia"}"#[..], JSON),
            (&b"<html>402</html>"[..], Some("text/html")),
            (&b"{not json"[..], JSON),
            (&br#"{"scheme":"fhe-transfer"}"#[..], JSON),
            (&b""[..], None),
        ];
        for (body, content_type) in cases {
            assert!(parse_challenge(402, body, content_type).is_none());
        }
    }

    #[test]
    fn negative_amount_is_rejected() {
        let mut value = serde_json::to_value(requirement()).unwrap();
        value["maxAmountRequired"] = "-1".into();
        let body = serde_json::to_vec(&value).unwrap();
        assert!(parse_challenge(402, &body, JSON).is_none());
    }

    #[test]
    fn payload_inherits_requirement_identity() {
        let mut req = requirement();
        req.network = "localfhenix".to_string();
        req.chain_id = 31337;
        let payload = build_payload(&req, B256::repeat_byte(0xab), signature());
        assert_eq!(payload.x402_version, 1);
        assert_eq!(payload.scheme, req.scheme);
        assert_eq!(payload.network, req.network);
        assert_eq!(payload.chain_id, req.chain_id);
        assert_eq!(payload.payload.tx_hash, B256::repeat_byte(0xab));
    }

    #[test]
    fn payload_header_decodes_what_it_encodes() {
        let payload = build_payload(&requirement(), B256::repeat_byte(0x11), signature());
        let header = encode_payload_header(&payload).unwrap();
        assert_eq!(decode_payload_header(&header).unwrap(), payload);
    }

    #[test]
    fn payload_header_rejects_garbage() {
        assert!(decode_payload_header("not-valid-base64!!!").is_err());
        let not_json = base64::engine::general_purpose::STANDARD.encode(b"plain text");
        assert!(decode_payload_header(&not_json).is_err());
    }
}
