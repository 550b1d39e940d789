//! Capability traits consumed by the payment protocol.
//!
//! - [`FheCapability`]: encrypt/decrypt and decryption-signature gating
//! - [`ConfidentialTokenGateway`]: reads and writes on the ERC-7984 token contract
//! - [`SchemeFacilitator`]: turns a payment proof into a [`PaymentVerifyResult`]
//!
//! The protocol layer never assumes a concrete backend: an FHE relayer, a
//! live chain or the in-memory doubles in [`crate::mock`] substitute freely.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use serde::{Deserialize, Serialize};

use crate::error::X402Error;
use crate::payment::{
    CiphertextHandle, DecryptionSignature, EncryptedAmount, PaymentPayload, PaymentRequirement,
};
use crate::response::{HealthStatus, PaymentVerifyResult};

/// Homomorphic-encryption capability.
pub trait FheCapability: Send + Sync {
    /// Whether decrypting `handle` (owned by contract `asset`) needs a user signature.
    fn requires_signature(
        &self,
        handle: &CiphertextHandle,
        asset: Address,
    ) -> impl std::future::Future<Output = Result<bool, X402Error>> + Send;

    /// Ask the user to authorize decryption for `assets` during `duration_days`.
    /// Typically triggers a wallet-signing prompt.
    fn create_decryption_signature(
        &self,
        user: Address,
        assets: &[Address],
        duration_days: u32,
    ) -> impl std::future::Future<Output = Result<DecryptionSignature, X402Error>> + Send;

    /// Decrypt `handle` to its cleartext amount.
    ///
    /// Fails with [`X402Error::SignatureRequired`] when a signature is needed
    /// and `signature` is absent or does not authorize `asset` now, and with
    /// [`X402Error::DecryptionFailed`] on backend errors.
    fn decrypt(
        &self,
        handle: &CiphertextHandle,
        asset: Address,
        signature: Option<&DecryptionSignature>,
    ) -> impl std::future::Future<Output = Result<U256, X402Error>> + Send;

    /// Encrypt `amount` as an input for contract `asset`.
    fn encrypt(
        &self,
        amount: U256,
        asset: Address,
    ) -> impl std::future::Future<Output = Result<EncryptedAmount, X402Error>> + Send;
}

/// A `ConfidentialTransfer` event emitted by an ERC-7984 token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidentialTransferEvent {
    /// Token contract that emitted the event.
    pub token: Address,
    pub from: Address,
    pub to: Address,
    /// Handle of the transferred (encrypted) amount.
    pub amount: CiphertextHandle,
}

/// A mined transaction and the confidential transfers it performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedTransaction {
    pub tx_hash: TxHash,
    pub succeeded: bool,
    pub transfers: Vec<ConfidentialTransferEvent>,
}

/// Access to one confidential-token contract.
pub trait ConfidentialTokenGateway: Send + Sync {
    /// The token contract this gateway talks to.
    fn asset(&self) -> Address;

    /// Encrypted balance handle of `account`. `None` means zero or unread;
    /// read failures are logged and reported as `None`.
    fn read_balance_handle(
        &self,
        account: Address,
    ) -> impl std::future::Future<Output = Option<CiphertextHandle>> + Send;

    /// Submit `confidentialTransfer(to, handle, proof)`. Returns once the
    /// transaction is submitted, not once it is mined.
    fn transfer(
        &self,
        to: Address,
        handle: CiphertextHandle,
        proof: Bytes,
    ) -> impl std::future::Future<Output = Result<TxHash, X402Error>> + Send;

    /// Wait until `tx_hash` is mined. Fails with [`X402Error::TransferFailed`]
    /// if it reverted and [`X402Error::ChainError`] on timeout.
    fn wait_for_confirmation(
        &self,
        tx_hash: TxHash,
    ) -> impl std::future::Future<Output = Result<(), X402Error>> + Send;

    /// Look up a mined transaction and decode its `ConfidentialTransfer`
    /// events from any token. `None` if the transaction is unknown or pending.
    fn confirmed_transaction(
        &self,
        tx_hash: TxHash,
    ) -> impl std::future::Future<Output = Result<Option<ConfirmedTransaction>, X402Error>> + Send;

    /// Latest block number, for liveness checks.
    fn chain_head(&self) -> impl std::future::Future<Output = Result<u64, X402Error>> + Send;
}

/// Facilitator-side scheme: judges a payment proof against a requirement.
pub trait SchemeFacilitator: Send + Sync {
    /// Verify a payment payload against the requirement. Rejections are
    /// `Ok` with `is_valid = false`; `Err` is reserved for internal faults.
    fn verify(
        &self,
        payload: &PaymentPayload,
        requirement: &PaymentRequirement,
    ) -> impl std::future::Future<Output = Result<PaymentVerifyResult, X402Error>> + Send;

    /// Liveness of the verifier and its dependencies.
    fn health(&self) -> impl std::future::Future<Output = Result<HealthStatus, X402Error>> + Send;
}
