//! x402 client SDK for paying confidential-token 402 challenges.
//!
//! [`PaymentOrchestrator`] walks a request through the payment flow:
//! request -> 402 -> sign + transfer -> verify -> retry with proof.
//! [`ConfidentialWallet`] holds the user's encrypted balance and caches the
//! decryption signature so the user is prompted once per session.
//!
//! # Quick Example
//!
//! ```no_run
//! use x402_client::{PaymentOrchestrator, PaymentOutcome, ProtocolConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), x402_client::X402Error> {
//! let mut orchestrator = PaymentOrchestrator::new(&ProtocolConfig::default());
//! match orchestrator
//!     .pay_with_resource("https://api.example.com/premium-data")
//!     .await?
//! {
//!     PaymentOutcome::Success(data) => println!("{data}"),
//!     PaymentOutcome::PaymentRequired(req) => {
//!         println!("pay {} to {}", req.max_amount_required, req.pay_to);
//!         // then: orchestrator.complete_payment(&mut wallet).await?
//!     }
//!     PaymentOutcome::Failed(reason) => eprintln!("failed: {reason}"),
//! }
//! # Ok(())
//! # }
//! ```

mod orchestrator;
mod wallet;

pub use orchestrator::{
    PaymentOrchestrator, PaymentOutcome, FETCH_AFTER_PAYMENT_FAILED, NO_REQUIREMENT,
};
pub use wallet::ConfidentialWallet;

// Re-export commonly needed types from core
pub use x402::{
    DecryptionSignature, FacilitatorClient, PaymentPayload, PaymentRequirement, PaymentState,
    PaymentVerifyResult, ProtocolConfig, X402Error, DEFAULT_TOKEN, SCHEME_NAME,
};
