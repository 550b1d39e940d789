//! x402 facilitator: judges fhe-transfer payment proofs over HTTP.
//!
//! Resource servers and clients `POST /verify` a payment payload with its
//! requirement and get back a [`PaymentVerifyResult`](x402::PaymentVerifyResult).
//! Verification itself lives in the core [`x402`] crate; this crate provides
//! the HTTP surface, generic over any [`SchemeFacilitator`](x402::SchemeFacilitator).
//!
//! # Modules
//!
//! - [`routes`]: HTTP endpoints (verify, health, supported, metrics)
//! - [`state`]: Shared [`AppState`](state::AppState)
//! - [`metrics`]: Prometheus metrics for verification outcomes

pub mod metrics;
pub mod routes;
pub mod state;
