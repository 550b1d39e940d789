use std::str::FromStr;

use actix_web::http::header::ContentType;
use actix_web::{HttpRequest, HttpResponse};
use alloy::primitives::TxHash;
use x402::codec::{build_challenge, decode_payload_header};
use x402::{
    PaymentPayload, PaymentRequirement, SchemeFacilitator, PAYMENT_PAYLOAD_HEADER,
    PAYMENT_TX_HASH_HEADER,
};

use crate::config::PaymentConfig;
use crate::metrics::{PAYMENT_ATTEMPTS, REQUESTS};
use crate::state::ServerState;

/// A payment the facilitator accepted for this request.
#[derive(Debug, Clone)]
pub struct VerifiedPayment {
    pub tx_hash: String,
    pub amount: Option<String>,
    pub requirement: PaymentRequirement,
}

/// The requirement to issue for this request, bound to the request URL.
pub fn requirement_for(req: &HttpRequest, config: &PaymentConfig) -> Option<PaymentRequirement> {
    config
        .get_route(req.method().as_str(), req.path())
        .map(|route| route.requirement.with_resource(req.full_url().to_string()))
}

/// 402 with `requirement` as the whole JSON body, plus `error` when a
/// presented proof was rejected.
pub fn payment_required_response(
    requirement: &PaymentRequirement,
    error: Option<&str>,
) -> HttpResponse {
    let body = match (build_challenge(requirement), error) {
        (Ok(body), None) => body,
        (Ok(body), Some(reason)) => with_error_field(body, reason),
        (Err(e), _) => {
            tracing::error!(error = %e, "failed to serialize payment challenge");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "internal error",
                "message": "could not build payment challenge"
            }));
        }
    };
    HttpResponse::PaymentRequired()
        .content_type(ContentType::json())
        .body(body)
}

fn with_error_field(body: Vec<u8>, reason: &str) -> Vec<u8> {
    match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(mut value) => {
            if let Some(object) = value.as_object_mut() {
                object.insert("error".to_string(), reason.into());
            }
            serde_json::to_vec(&value).unwrap_or(body)
        }
        Err(_) => body,
    }
}

fn bad_request(error: &str, message: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({
        "error": error,
        "message": message.into(),
    }))
}

/// Why a presented proof did not unlock the resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentDenied {
    /// The facilitator judged the proof invalid.
    Rejected(String),
    /// The facilitator could not be asked.
    Unavailable,
}

impl PaymentDenied {
    pub fn unavailable_response() -> HttpResponse {
        HttpResponse::InternalServerError().json(serde_json::json!({
            "error": "payment processing failed",
            "message": "payment could not be verified, try again later"
        }))
    }
}

/// Ask `verifier` about `payload` for `requirement`, counting the outcome
/// under `endpoint`.
pub async fn verify_payment<S: SchemeFacilitator>(
    verifier: &S,
    payload: &PaymentPayload,
    requirement: &PaymentRequirement,
    endpoint: &str,
) -> Result<VerifiedPayment, PaymentDenied> {
    tracing::info!(
        tx = %payload.payload.tx_hash,
        payer = %payload.payload.decryption_signature.user_address,
        "payment attempt"
    );

    match verifier.verify(payload, requirement).await {
        Ok(verdict) if verdict.is_valid => {
            PAYMENT_ATTEMPTS.with_label_values(&["success"]).inc();
            REQUESTS.with_label_values(&[endpoint, "200"]).inc();
            Ok(VerifiedPayment {
                tx_hash: verdict
                    .tx_hash
                    .unwrap_or_else(|| payload.payload.tx_hash.to_string()),
                amount: verdict.amount,
                requirement: requirement.clone(),
            })
        }
        Ok(verdict) => {
            PAYMENT_ATTEMPTS.with_label_values(&["rejected"]).inc();
            REQUESTS.with_label_values(&[endpoint, "402"]).inc();
            let reason = verdict.reason_or_unknown();
            tracing::warn!(tx = %payload.payload.tx_hash, reason, "payment rejected");
            Err(PaymentDenied::Rejected(reason.to_string()))
        }
        Err(e) => {
            PAYMENT_ATTEMPTS.with_label_values(&["error"]).inc();
            REQUESTS.with_label_values(&[endpoint, "500"]).inc();
            tracing::error!(error = %e, "facilitator communication error");
            Err(PaymentDenied::Unavailable)
        }
    }
}

/// Payment gate for header-carried proofs.
///
/// No `X-Payment-TxHash`: a fresh 402 challenge. With it: the
/// `X-Payment-Payload` proof must be present and name the same transaction,
/// and the facilitator must accept it before the caller releases content.
pub async fn require_payment<S: SchemeFacilitator>(
    req: &HttpRequest,
    state: &ServerState<S>,
) -> Result<VerifiedPayment, HttpResponse> {
    // Use the matched route pattern (not raw path) to bound label cardinality
    let endpoint = req.match_pattern().unwrap_or_else(|| "unknown".to_string());

    let Some(requirement) = requirement_for(req, &state.payments) else {
        tracing::error!(path = req.path(), "payment gate on an unpriced route");
        return Err(HttpResponse::InternalServerError().json(serde_json::json!({
            "error": "internal error",
            "message": "route is not priced"
        })));
    };

    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let Some(tx_header) = header(PAYMENT_TX_HASH_HEADER) else {
        REQUESTS.with_label_values(&[endpoint.as_str(), "402"]).inc();
        return Err(payment_required_response(&requirement, None));
    };

    let tx_hash = match TxHash::from_str(tx_header) {
        Ok(tx) => tx,
        Err(e) => {
            REQUESTS.with_label_values(&[endpoint.as_str(), "400"]).inc();
            return Err(bad_request(
                "invalid payment header",
                format!("{PAYMENT_TX_HASH_HEADER} is not a transaction hash: {e}"),
            ));
        }
    };

    let Some(encoded) = header(PAYMENT_PAYLOAD_HEADER) else {
        REQUESTS.with_label_values(&[endpoint.as_str(), "400"]).inc();
        return Err(bad_request(
            "payment payload required",
            format!("{PAYMENT_PAYLOAD_HEADER} must accompany {PAYMENT_TX_HASH_HEADER}"),
        ));
    };

    let payload = match decode_payload_header(encoded) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "invalid payment payload header");
            REQUESTS.with_label_values(&[endpoint.as_str(), "400"]).inc();
            return Err(bad_request("invalid payment header", e.to_string()));
        }
    };

    if payload.payload.tx_hash != tx_hash {
        REQUESTS.with_label_values(&[endpoint.as_str(), "400"]).inc();
        return Err(bad_request(
            "payment proof mismatch",
            "payload transaction does not match the transaction header",
        ));
    }

    verify_payment(&state.verifier, &payload, &requirement, &endpoint)
        .await
        .map_err(|denied| match denied {
            PaymentDenied::Rejected(reason) => {
                payment_required_response(&requirement, Some(&reason))
            }
            PaymentDenied::Unavailable => PaymentDenied::unavailable_response(),
        })
}
