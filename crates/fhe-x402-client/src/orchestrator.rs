//! Client-side payment state machine.
//!
//! ```text
//! idle -> requesting -> success
//!              |
//!              v
//!       payment_required -> [signing] -> [transferring] -> verifying -> requesting -> success
//!
//! any non-idle, non-terminal state -> error
//! ```
//!
//! Signing and transferring need user consent and are performed by the
//! caller (or by [`PaymentOrchestrator::complete_payment`] with a wallet).
//! The orchestrator itself only speaks HTTP: to the resource and to the
//! facilitator.

use alloy::primitives::TxHash;
use reqwest::header::CONTENT_TYPE;
use x402::codec::{build_payload, encode_payload_header, parse_challenge};
use x402::{
    ConfidentialTokenGateway, DecryptionSignature, FacilitatorClient, FheCapability,
    PaymentPayload, PaymentRequirement, PaymentState, ProtocolConfig, X402Error,
    PAYMENT_PAYLOAD_HEADER, PAYMENT_TX_HASH_HEADER,
};

use crate::wallet::ConfidentialWallet;

/// Message recorded when a 402 carries no usable requirement.
pub const NO_REQUIREMENT: &str = "payment required but no requirement provided";
/// Message recorded when the resource still demands payment after a verified proof.
pub const FETCH_AFTER_PAYMENT_FAILED: &str = "Failed to fetch resource after payment";

/// What a step of the payment flow produced.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    /// The resource body.
    Success(serde_json::Value),
    /// The resource is payment-gated; pay this and call
    /// [`PaymentOrchestrator::submit_proof`].
    PaymentRequired(PaymentRequirement),
    /// The attempt ended in `error` with this message.
    Failed(String),
}

/// Drives one payment attempt at a time against a resource URL.
pub struct PaymentOrchestrator {
    http: reqwest::Client,
    facilitator: FacilitatorClient,
    state: PaymentState,
    resource_url: Option<String>,
    requirement: Option<PaymentRequirement>,
    error: Option<String>,
}

impl PaymentOrchestrator {
    pub fn new(config: &ProtocolConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("failed to build HTTP client");
        Self::with_http_client(config, http)
    }

    /// Create an orchestrator with a custom reqwest::Client, shared with the
    /// facilitator client.
    pub fn with_http_client(config: &ProtocolConfig, http: reqwest::Client) -> Self {
        Self {
            facilitator: FacilitatorClient::with_http_client(config, http.clone()),
            http,
            state: PaymentState::Idle,
            resource_url: None,
            requirement: None,
            error: None,
        }
    }

    pub fn state(&self) -> PaymentState {
        self.state
    }

    /// Requirement of the current attempt, once a challenge was parsed.
    pub fn requirement(&self) -> Option<&PaymentRequirement> {
        self.requirement.as_ref()
    }

    /// Error message of an attempt that ended in `error`.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn resource_url(&self) -> Option<&str> {
        self.resource_url.as_deref()
    }

    pub fn facilitator(&self) -> &FacilitatorClient {
        &self.facilitator
    }

    /// Back to `idle` from anywhere, forgetting the current attempt.
    pub fn reset(&mut self) {
        if self.state != PaymentState::Idle {
            tracing::debug!(from = %self.state, to = %PaymentState::Idle, "payment state reset");
        }
        self.state = PaymentState::Idle;
        self.resource_url = None;
        self.requirement = None;
        self.error = None;
    }

    /// Start a new attempt: request `url` and report whether it was served,
    /// is payment-gated, or failed.
    ///
    /// Returns `Err` only for misuse: starting while another attempt is in flight.
    pub async fn pay_with_resource(&mut self, url: &str) -> Result<PaymentOutcome, X402Error> {
        if !self.state.accepts_new_attempt() {
            return Err(X402Error::AlreadyInProgress(self.state));
        }
        self.reset();
        self.resource_url = Some(url.to_string());
        self.transition(PaymentState::Requesting)?;
        self.fetch_resource(None).await
    }

    /// The caller is collecting a decryption signature.
    pub fn begin_signing(&mut self) -> Result<(), X402Error> {
        self.transition(PaymentState::Signing)
    }

    /// The caller is submitting the confidential transfer.
    pub fn begin_transferring(&mut self) -> Result<(), X402Error> {
        self.transition(PaymentState::Transferring)
    }

    /// Record a fault from a caller-driven step and end the attempt.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<PaymentOutcome, X402Error> {
        let message = message.into();
        self.transition(PaymentState::Error)?;
        tracing::warn!(error = %message, "payment attempt failed");
        self.error = Some(message.clone());
        Ok(PaymentOutcome::Failed(message))
    }

    /// Submit proof of a confirmed transfer: verify it with the facilitator
    /// and, if accepted, re-request the resource carrying the proof.
    pub async fn submit_proof(
        &mut self,
        tx_hash: TxHash,
        decryption_signature: &DecryptionSignature,
    ) -> Result<PaymentOutcome, X402Error> {
        let Some(requirement) = self.requirement.clone() else {
            return Err(X402Error::InvalidTransition {
                from: self.state,
                to: PaymentState::Verifying,
            });
        };
        self.transition(PaymentState::Verifying)?;

        let payload = build_payload(&requirement, tx_hash, decryption_signature.clone());
        let verdict = self.facilitator.verify(&payload, &requirement).await;
        if !verdict.is_valid {
            let reason = verdict.reason_or_unknown().to_string();
            tracing::warn!(tx = %tx_hash, reason = %reason, "payment verification rejected");
            return self.fail(reason);
        }

        tracing::info!(tx = %tx_hash, amount = ?verdict.amount, "payment verified");
        self.transition(PaymentState::Requesting)?;
        self.fetch_resource(Some(&payload)).await
    }

    /// Run the consent steps with `wallet` (signature, transfer, confirmation)
    /// and then [`Self::submit_proof`]. Capability faults end the attempt in
    /// `error` and are reported as [`PaymentOutcome::Failed`].
    pub async fn complete_payment<G, F>(
        &mut self,
        wallet: &mut ConfidentialWallet<G, F>,
    ) -> Result<PaymentOutcome, X402Error>
    where
        G: ConfidentialTokenGateway,
        F: FheCapability,
    {
        let Some(requirement) = self.requirement.clone() else {
            return Err(X402Error::InvalidTransition {
                from: self.state,
                to: PaymentState::Signing,
            });
        };

        self.begin_signing()?;
        let signature = match wallet.ensure_decryption_signature().await {
            Ok(sig) => sig,
            Err(e) => return self.fail(e.to_string()),
        };

        self.begin_transferring()?;
        let tx_hash = match wallet.pay(&requirement).await {
            Ok(tx) => tx,
            Err(e) => return self.fail(e.to_string()),
        };

        self.submit_proof(tx_hash, &signature).await
    }

    fn transition(&mut self, next: PaymentState) -> Result<(), X402Error> {
        if !self.state.can_transition_to(next) {
            return Err(X402Error::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(from = %self.state, to = %next, "payment state transition");
        self.state = next;
        Ok(())
    }

    /// Issue the request for the current resource; `proof` marks the
    /// re-issued, paid request.
    async fn fetch_resource(
        &mut self,
        proof: Option<&PaymentPayload>,
    ) -> Result<PaymentOutcome, X402Error> {
        let url = self.resource_url.clone().unwrap_or_default();
        let mut request = self.http.get(&url);
        if let Some(payload) = proof {
            let encoded = match encode_payload_header(payload) {
                Ok(encoded) => encoded,
                Err(e) => return self.fail(e.to_string()),
            };
            request = request
                .header(PAYMENT_TX_HASH_HEADER, payload.payload.tx_hash.to_string())
                .header(PAYMENT_PAYLOAD_HEADER, encoded);
        }

        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "resource request failed");
                return self.fail(e.to_string());
            }
        };

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = match resp.bytes().await {
            Ok(body) => body,
            Err(e) => return self.fail(e.to_string()),
        };

        if status == x402::codec::PAYMENT_REQUIRED_STATUS {
            if proof.is_some() {
                return self.fail(FETCH_AFTER_PAYMENT_FAILED);
            }
            return match parse_challenge(status, &body, content_type.as_deref()) {
                Some(requirement) => {
                    tracing::info!(
                        url = %url,
                        amount = %requirement.max_amount_required,
                        pay_to = %requirement.pay_to,
                        "resource requires payment"
                    );
                    self.requirement = Some(requirement.clone());
                    self.transition(PaymentState::PaymentRequired)?;
                    Ok(PaymentOutcome::PaymentRequired(requirement))
                }
                None => self.fail(NO_REQUIREMENT),
            };
        }

        match serde_json::from_slice::<serde_json::Value>(&body) {
            Ok(data) => {
                self.transition(PaymentState::Success)?;
                Ok(PaymentOutcome::Success(data))
            }
            Err(e) => self.fail(format!("resource response is not JSON: {e}")),
        }
    }
}
