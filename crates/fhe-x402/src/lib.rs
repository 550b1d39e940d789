//! x402 pay-per-request protocol settled with confidential (FHE) token transfers.
//!
//! A resource server answers an unpaid request with HTTP 402 and a
//! [`PaymentRequirement`]. The client sends an encrypted ERC-7984
//! `confidentialTransfer` to the payee, authorizes decryption of the amount,
//! and retries with the transaction hash. A facilitator decrypts the
//! transferred amount and decides whether the payment covers the price.
//!
//! # Three-party model
//!
//! - **Client** drives the flow (see the `fhe-x402-client` crate)
//! - **Server** gates endpoints with [`codec::build_challenge`]
//! - **Facilitator** ([`FheSchemeFacilitator`], or remotely via
//!   [`FacilitatorClient`]) verifies proofs
//!
//! # Quick example (parsing a challenge)
//!
//! ```no_run
//! # async fn run() -> Result<(), x402::X402Error> {
//! let resp = reqwest::get("https://api.example.com/premium-data")
//!     .await
//!     .map_err(|e| x402::X402Error::HttpError(e.to_string()))?;
//! let status = resp.status().as_u16();
//! let content_type = resp
//!     .headers()
//!     .get("content-type")
//!     .and_then(|v| v.to_str().ok())
//!     .map(str::to_owned);
//! let body = resp.bytes().await.map_err(|e| x402::X402Error::HttpError(e.to_string()))?;
//! if let Some(requirement) = x402::parse_challenge(status, &body, content_type.as_deref()) {
//!     println!("pay {} to {}", requirement.max_amount_required, requirement.pay_to);
//! }
//! # Ok(())
//! # }
//! ```

// Core types and traits
pub mod codec;
pub mod constants;
pub mod error;
pub mod payment;
pub mod response;
pub mod scheme;
pub mod security;
pub mod state;

// Verification against the chain
pub mod scheme_facilitator;

// Chain and HTTP backends
#[cfg(feature = "full")]
pub mod confidential;
#[cfg(feature = "full")]
pub mod facilitator_client;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

use alloy::sol;

// ERC-7984 confidential token interface. Amounts are ciphertext handles.
sol! {
    #[sol(rpc)]
    interface IERC7984 {
        event ConfidentialTransfer(address indexed from, address indexed to, bytes32 indexed amount);

        function confidentialBalanceOf(address account) external view returns (bytes32);
        function confidentialTransfer(address to, bytes32 encryptedAmount, bytes inputProof) external returns (bytes32);
    }
}

// Re-exports
pub use codec::{build_challenge, build_payload, parse_challenge};
pub use constants::ProtocolConfig;
pub use constants::*;
pub use error::X402Error;
pub use payment::*;
pub use response::*;
pub use scheme::*;
pub use state::PaymentState;

pub use scheme_facilitator::FheSchemeFacilitator;

#[cfg(feature = "full")]
pub use confidential::Erc7984Gateway;
#[cfg(feature = "full")]
pub use facilitator_client::FacilitatorClient;
