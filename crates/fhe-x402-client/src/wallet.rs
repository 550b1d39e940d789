use alloy::primitives::{Address, TxHash, U256};
use x402::{
    CiphertextHandle, ConfidentialTokenGateway, DecryptionSignature, FheCapability,
    PaymentRequirement, X402Error, DEFAULT_SIGNATURE_DURATION_DAYS,
};

/// A user's view of one confidential token: encrypted balance, its cleartext
/// once decrypted, and the session's decryption signature.
///
/// The signature is created at most once per validity window. Creating one
/// prompts the user, so nothing here does it implicitly.
pub struct ConfidentialWallet<G, F> {
    gateway: G,
    fhe: F,
    address: Address,
    signature_duration_days: u32,
    signature: Option<DecryptionSignature>,
    balance_handle: Option<CiphertextHandle>,
    balance: Option<U256>,
}

impl<G, F> ConfidentialWallet<G, F>
where
    G: ConfidentialTokenGateway,
    F: FheCapability,
{
    pub fn new(gateway: G, fhe: F, address: Address) -> Self {
        Self {
            gateway,
            fhe,
            address,
            signature_duration_days: DEFAULT_SIGNATURE_DURATION_DAYS,
            signature: None,
            balance_handle: None,
            balance: None,
        }
    }

    /// Validity of signatures this wallet creates.
    pub fn with_signature_duration(mut self, days: u32) -> Self {
        self.signature_duration_days = days;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// The confidential token contract.
    pub fn asset(&self) -> Address {
        self.gateway.asset()
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn balance_handle(&self) -> Option<CiphertextHandle> {
        self.balance_handle
    }

    /// Cleartext balance, if decrypted since the handle last changed.
    pub fn balance(&self) -> Option<U256> {
        self.balance
    }

    pub fn is_decrypted(&self) -> bool {
        self.balance.is_some()
    }

    /// Re-read the encrypted balance handle. A changed handle invalidates the
    /// decrypted balance.
    pub async fn refresh_balance_handle(&mut self) -> Option<CiphertextHandle> {
        let handle = self.gateway.read_balance_handle(self.address).await;
        if handle != self.balance_handle {
            self.balance = None;
        }
        self.balance_handle = handle;
        handle
    }

    /// Cached signature, if it still authorizes this wallet's token.
    pub fn decryption_signature(&self) -> Option<&DecryptionSignature> {
        let asset = self.asset();
        let now = x402::unix_now();
        self.signature
            .as_ref()
            .filter(|sig| sig.authorizes(asset, now))
    }

    pub fn has_signature(&self) -> bool {
        self.decryption_signature().is_some()
    }

    /// Return the cached decryption signature, creating (and prompting for)
    /// one only when none is valid for this token.
    pub async fn ensure_decryption_signature(&mut self) -> Result<DecryptionSignature, X402Error> {
        if let Some(sig) = self.decryption_signature() {
            return Ok(sig.clone());
        }

        let asset = self.asset();
        tracing::info!(user = %self.address, token = %asset, "requesting decryption signature");
        let sig = self
            .fhe
            .create_decryption_signature(self.address, &[asset], self.signature_duration_days)
            .await?;
        self.signature = Some(sig.clone());
        Ok(sig)
    }

    /// Decrypt the balance using the cached signature.
    ///
    /// Fails with [`X402Error::SignatureRequired`] if the backend needs a
    /// signature and none is cached; the wallet is left as it was.
    pub async fn decrypt_balance(&mut self) -> Result<U256, X402Error> {
        let handle = match self.balance_handle {
            Some(handle) => handle,
            None => match self.refresh_balance_handle().await {
                Some(handle) => handle,
                None => {
                    self.balance = Some(U256::ZERO);
                    return Ok(U256::ZERO);
                }
            },
        };

        let asset = self.asset();
        let signature = self.decryption_signature().cloned();
        if signature.is_none() && self.fhe.requires_signature(&handle, asset).await? {
            return Err(X402Error::SignatureRequired);
        }

        let amount = self.fhe.decrypt(&handle, asset, signature.as_ref()).await?;
        self.balance = Some(amount);
        Ok(amount)
    }

    /// True only once the balance is decrypted and covers `amount`.
    pub fn can_transfer(&self, amount: U256) -> bool {
        self.balance.is_some_and(|balance| balance >= amount)
    }

    /// Encrypt `amount` and submit a confidential transfer to `to`.
    /// Returns on submission; see [`Self::await_confirmation`].
    pub async fn transfer(&mut self, to: Address, amount: U256) -> Result<TxHash, X402Error> {
        let asset = self.asset();
        let input = self.fhe.encrypt(amount, asset).await?;
        let tx_hash = self.gateway.transfer(to, input.handle, input.proof).await?;
        self.balance = None;
        tracing::info!(%to, tx = %tx_hash, "confidential transfer submitted");
        Ok(tx_hash)
    }

    pub async fn await_confirmation(&self, tx_hash: TxHash) -> Result<(), X402Error> {
        self.gateway.wait_for_confirmation(tx_hash).await
    }

    /// Pay `requirement` in full: transfer `maxAmountRequired` to `payTo` and
    /// wait for the transaction to be mined.
    pub async fn pay(&mut self, requirement: &PaymentRequirement) -> Result<TxHash, X402Error> {
        if requirement.asset != self.asset() {
            return Err(X402Error::TransferFailed(format!(
                "requirement asks for token {} but wallet holds {}",
                requirement.asset,
                self.asset()
            )));
        }
        let amount = requirement.required_amount()?;
        if self.is_decrypted() && !self.can_transfer(amount) {
            return Err(X402Error::TransferFailed(format!(
                "insufficient confidential balance for {amount}"
            )));
        }

        let tx_hash = self.transfer(requirement.pay_to, amount).await?;
        self.await_confirmation(tx_hash).await?;
        Ok(tx_hash)
    }
}
