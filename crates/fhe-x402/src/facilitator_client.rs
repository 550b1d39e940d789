//! HTTP client for a remote facilitator's `/verify`, `/health` and `/supported`
//! endpoints.
//!
//! Used by the client-side orchestrator and by resource servers. Verification
//! never fails with an error: transport faults and unusable responses are
//! folded into an invalid [`PaymentVerifyResult`].

use reqwest::header::CONTENT_TYPE;

use crate::codec::is_json_content_type;
use crate::constants::ProtocolConfig;
use crate::payment::{PaymentPayload, PaymentRequirement, VerifyRequest};
use crate::response::{HealthStatus, PaymentVerifyResult, SupportedResponse};
use crate::scheme::SchemeFacilitator;
use crate::X402Error;

/// Longest slice of a non-JSON error body quoted in a rejection reason.
pub const ERROR_BODY_PREVIEW_CHARS: usize = 100;

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct FacilitatorClient {
    http: reqwest::Client,
    default_base_url: String,
    /// Ignore `requirement.facilitator` and always use `default_base_url`.
    pinned: bool,
}

impl FacilitatorClient {
    pub fn new(config: &ProtocolConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("failed to build HTTP client");
        Self::with_http_client(config, http)
    }

    /// Create a client with a custom reqwest::Client.
    pub fn with_http_client(config: &ProtocolConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            default_base_url: config
                .facilitator_base_url
                .trim_end_matches('/')
                .to_string(),
            pinned: false,
        }
    }

    /// Verify only against the configured base URL, whatever facilitator a
    /// requirement names. For requirements received from callers.
    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Base URL used when a requirement does not name its own facilitator.
    pub fn base_url(&self) -> &str {
        &self.default_base_url
    }

    /// The requirement's facilitator if present, else the configured default.
    /// A pinned client always answers the configured default.
    pub fn base_url_for(&self, requirement: &PaymentRequirement) -> String {
        if self.pinned {
            return self.default_base_url.clone();
        }
        requirement
            .facilitator
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(&self.default_base_url)
            .trim_end_matches('/')
            .to_string()
    }

    /// `POST {facilitator}/verify`.
    pub async fn verify(
        &self,
        payload: &PaymentPayload,
        requirement: &PaymentRequirement,
    ) -> PaymentVerifyResult {
        let url = format!("{}/verify", self.base_url_for(requirement));
        let body = VerifyRequest::new(payload, requirement);

        let resp = match self.http.post(&url).json(&body).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "payment verification request failed");
                let reason = e.to_string();
                return PaymentVerifyResult::invalid(if reason.is_empty() {
                    "Network error during verification".to_string()
                } else {
                    reason
                });
            }
        };

        let status = resp.status();
        let is_json = is_json_content_type(
            resp.headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );

        if !status.is_success() {
            let reason = if is_json {
                match resp.json::<serde_json::Value>().await {
                    Ok(body) => reason_from_error_body(&body),
                    Err(_) => unparseable(status.as_u16()),
                }
            } else {
                match resp.text().await {
                    Ok(text) => format!(
                        "Facilitator error ({}): {}...",
                        status.as_u16(),
                        preview(&text)
                    ),
                    Err(_) => unparseable(status.as_u16()),
                }
            };
            tracing::warn!(status = status.as_u16(), reason = %reason, "facilitator returned an error");
            return PaymentVerifyResult::invalid(reason);
        }

        if !is_json {
            return PaymentVerifyResult::invalid("Facilitator returned non-JSON response");
        }

        match resp.json::<PaymentVerifyResult>().await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(error = %e, "facilitator verdict could not be decoded");
                PaymentVerifyResult::invalid(format!("Facilitator response parse failed: {e}"))
            }
        }
    }

    /// `GET {facilitator}/health`. Operational probing only.
    pub async fn health(&self) -> Result<HealthStatus, X402Error> {
        let url = format!("{}/health", self.default_base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| X402Error::FacilitatorUnreachable(e.to_string()))?;
        // Degraded services still answer with a status document.
        resp.json::<HealthStatus>()
            .await
            .map_err(|e| X402Error::HttpError(format!("health response parse failed: {e}")))
    }

    /// `GET {facilitator}/supported`.
    pub async fn supported(&self) -> Result<SupportedResponse, X402Error> {
        let url = format!("{}/supported", self.default_base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| X402Error::FacilitatorUnreachable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(X402Error::HttpError(format!(
                "supported request failed with status {}",
                resp.status().as_u16()
            )));
        }
        resp.json::<SupportedResponse>()
            .await
            .map_err(|e| X402Error::HttpError(format!("supported response parse failed: {e}")))
    }
}

/// A facilitator client is itself a verifier: it delegates to the remote service.
impl SchemeFacilitator for FacilitatorClient {
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirement: &PaymentRequirement,
    ) -> Result<PaymentVerifyResult, X402Error> {
        Ok(FacilitatorClient::verify(self, payload, requirement).await)
    }

    async fn health(&self) -> Result<HealthStatus, X402Error> {
        FacilitatorClient::health(self).await
    }
}

fn reason_from_error_body(body: &serde_json::Value) -> String {
    ["invalidReason", "message", "error"]
        .iter()
        .filter_map(|key| body.get(*key).and_then(|v| v.as_str()))
        .find(|reason| !reason.trim().is_empty())
        .unwrap_or("Verification failed")
        .to_string()
}

fn unparseable(status: u16) -> String {
    format!("Facilitator error ({status}): Unable to parse response")
}

fn preview(text: &str) -> String {
    text.chars().take(ERROR_BODY_PREVIEW_CHARS).collect()
}
