//! x402 resource server: gates HTTP endpoints behind fhe-transfer payments.
//!
//! Priced routes answer HTTP 402 with a [`PaymentRequirement`](x402::PaymentRequirement)
//! as the JSON body. A client pays with a confidential token transfer and
//! retries with `X-Payment-TxHash` and `X-Payment-Payload`; the server asks a
//! facilitator to verify the proof before releasing the content.
//!
//! # Modules
//!
//! - [`config`]: priced routes ([`PaymentConfigBuilder`](config::PaymentConfigBuilder)) and process settings
//! - [`middleware`]: the payment gate ([`require_payment`](middleware::require_payment))
//! - [`routes`]: `/premium-data`, `/health`, `/metrics`
//! - [`state`]: shared [`ServerState`](state::ServerState)
//! - [`metrics`]: Prometheus counters for requests and payment attempts

pub mod config;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::{PaymentConfig, PaymentConfigBuilder, RoutePaymentConfig, ServerSettings};
pub use middleware::{
    payment_required_response, require_payment, requirement_for, verify_payment, PaymentDenied,
    VerifiedPayment,
};
pub use state::ServerState;
