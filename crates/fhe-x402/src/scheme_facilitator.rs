use alloy::primitives::{Address, U256};

use crate::{
    unix_now, ConfidentialTokenGateway, FheCapability, HealthStatus, PaymentPayload,
    PaymentRequirement, PaymentVerifyResult, ProtocolConfig, SchemeFacilitator, X402Error,
    SCHEME_NAME, X402_VERSION,
};

/// Facilitator-side scheme implementation: finds the confidential transfer a
/// payment proof points at and decrypts its amount with the payer's signature.
pub struct FheSchemeFacilitator<G, F> {
    gateway: G,
    fhe: F,
    config: ProtocolConfig,
    /// Accepted token addresses. Empty = accept any token.
    accepted_tokens: Vec<Address>,
}

impl<G, F> FheSchemeFacilitator<G, F>
where
    G: ConfidentialTokenGateway,
    F: FheCapability,
{
    /// Create a facilitator for the network in `config`.
    pub fn new(gateway: G, fhe: F, config: ProtocolConfig) -> Self {
        Self {
            gateway,
            fhe,
            config,
            accepted_tokens: vec![],
        }
    }

    /// Restrict accepted token addresses. When non-empty, payments in other
    /// tokens are rejected.
    pub fn with_accepted_tokens(mut self, tokens: Vec<Address>) -> Self {
        self.accepted_tokens = tokens;
        self
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Tokens this facilitator settles in: the allowlist, or the gateway's asset.
    pub fn tokens(&self) -> Vec<Address> {
        if self.accepted_tokens.is_empty() {
            vec![self.gateway.asset()]
        } else {
            self.accepted_tokens.clone()
        }
    }

    /// Check RPC connectivity by fetching the latest block number.
    pub async fn health_check(&self) -> Result<u64, X402Error> {
        self.gateway.chain_head().await
    }

    fn reject(reason: impl Into<String>) -> Result<PaymentVerifyResult, X402Error> {
        Ok(PaymentVerifyResult::invalid(reason))
    }
}

impl<G, F> SchemeFacilitator for FheSchemeFacilitator<G, F>
where
    G: ConfidentialTokenGateway,
    F: FheCapability,
{
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirement: &PaymentRequirement,
    ) -> Result<PaymentVerifyResult, X402Error> {
        // 0. Protocol identity
        if payload.x402_version != X402_VERSION {
            return Self::reject(format!(
                "Unsupported x402 version: {} (expected {X402_VERSION})",
                payload.x402_version
            ));
        }
        if payload.scheme != SCHEME_NAME || requirement.scheme != SCHEME_NAME {
            return Self::reject(format!(
                "Scheme mismatch: expected '{SCHEME_NAME}', got '{}'",
                payload.scheme
            ));
        }
        if requirement.network != self.config.network
            || requirement.chain_id != self.config.default_chain_id
        {
            return Self::reject(format!(
                "Network mismatch: expected '{}' ({}), got '{}' ({})",
                self.config.network,
                self.config.default_chain_id,
                requirement.network,
                requirement.chain_id
            ));
        }
        if payload.network != requirement.network || payload.chain_id != requirement.chain_id {
            return Self::reject("Payment network does not match requirement");
        }
        if !self.accepted_tokens.is_empty() && !self.accepted_tokens.contains(&requirement.asset) {
            return Self::reject("Token not in facilitator's accepted token list");
        }

        let required = match requirement.required_amount() {
            Ok(amount) => amount,
            Err(_) => {
                return Self::reject(format!(
                    "Invalid required amount: '{}'",
                    requirement.max_amount_required
                ))
            }
        };

        // 1. Decryption authorization must cover the asset right now
        let data = &payload.payload;
        let signature = &data.decryption_signature;
        let payer = signature.user_address;
        if payer == Address::ZERO {
            return Self::reject("Payer address cannot be zero");
        }
        if payer == requirement.pay_to {
            return Self::reject("Self-payment not allowed");
        }
        if !signature.authorizes(requirement.asset, unix_now()) {
            return Self::reject("Decryption signature expired or does not cover the asset");
        }

        // 2. Locate the mined transfer
        let Some(tx) = self.gateway.confirmed_transaction(data.tx_hash).await? else {
            return Self::reject("Transaction not found");
        };
        if !tx.succeeded {
            return Self::reject("Transaction reverted");
        }
        let Some(transfer) = tx.transfers.iter().find(|t| {
            t.token == requirement.asset && t.to == requirement.pay_to && t.from == payer
        }) else {
            tracing::info!(
                tx = %data.tx_hash,
                payer = %payer,
                pay_to = %requirement.pay_to,
                "payment rejected: no matching confidential transfer"
            );
            return Self::reject("No confidential transfer to payee found in transaction");
        };

        // 3. Decrypt and compare
        let paid: U256 = match self
            .fhe
            .decrypt(&transfer.amount, requirement.asset, Some(signature))
            .await
        {
            Ok(amount) => amount,
            Err(e) => {
                tracing::warn!(tx = %data.tx_hash, error = %e, "transfer amount decryption failed");
                return Self::reject(format!("Unable to decrypt transferred amount: {e}"));
            }
        };

        if paid < required {
            tracing::info!(
                payer = %payer,
                paid = %paid,
                required = %required,
                "payment rejected: insufficient amount"
            );
            return Self::reject("Payment amount below required");
        }

        tracing::info!(
            payer = %payer,
            amount = %paid,
            tx = %data.tx_hash,
            "payment verification succeeded"
        );

        Ok(PaymentVerifyResult::valid(
            data.tx_hash.to_string(),
            paid.to_string(),
        ))
    }

    async fn health(&self) -> Result<HealthStatus, X402Error> {
        let block = self.health_check().await?;
        Ok(HealthStatus::ok("fhe-x402-facilitator")
            .with_detail("network", self.config.network.clone())
            .with_detail("chainId", self.config.default_chain_id)
            .with_detail("blockNumber", block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::build_payload;
    use crate::mock::{MockFhe, MockTokenGateway};
    use crate::payment::DecryptionSignature;
    use crate::scheme::{ConfidentialTransferEvent, ConfirmedTransaction};
    use alloy::primitives::B256;

    const PAYER: Address = Address::repeat_byte(0x01);
    const MERCHANT: Address = Address::repeat_byte(0xaa);

    fn config() -> ProtocolConfig {
        ProtocolConfig::default().with_merchant(MERCHANT)
    }

    fn requirement() -> PaymentRequirement {
        PaymentRequirement::for_resource(&config(), "/premium-data", "1000000", "premium").unwrap()
    }

    async fn signature(fhe: &MockFhe) -> DecryptionSignature {
        fhe.create_decryption_signature(PAYER, &[crate::DEFAULT_TOKEN], 1)
            .await
            .unwrap()
    }

    /// Ledger funded for PAYER, plus a facilitator over it.
    fn setup() -> (
        MockTokenGateway,
        MockFhe,
        FheSchemeFacilitator<MockTokenGateway, MockFhe>,
    ) {
        let fhe = MockFhe::new();
        let gateway = MockTokenGateway::new(crate::DEFAULT_TOKEN, PAYER, fhe.clone());
        gateway.mint(PAYER, U256::from(5_000_000u64));
        let facilitator = FheSchemeFacilitator::new(gateway.clone(), fhe.clone(), config());
        (gateway, fhe, facilitator)
    }

    async fn pay(gateway: &MockTokenGateway, fhe: &MockFhe, amount: u64) -> B256 {
        let encrypted = fhe
            .encrypt(U256::from(amount), crate::DEFAULT_TOKEN)
            .await
            .unwrap();
        gateway
            .transfer(MERCHANT, encrypted.handle, encrypted.proof)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn exact_payment_is_valid() {
        let (gateway, fhe, facilitator) = setup();
        let tx = pay(&gateway, &fhe, 1_000_000).await;
        let payload = build_payload(&requirement(), tx, signature(&fhe).await);

        let verdict = facilitator.verify(&payload, &requirement()).await.unwrap();
        assert!(verdict.is_valid, "{verdict:?}");
        assert_eq!(verdict.amount.as_deref(), Some("1000000"));
        assert_eq!(verdict.tx_hash, Some(tx.to_string()));
    }

    #[tokio::test]
    async fn underpayment_is_rejected() {
        let (gateway, fhe, facilitator) = setup();
        let tx = pay(&gateway, &fhe, 999_999).await;
        let payload = build_payload(&requirement(), tx, signature(&fhe).await);

        let verdict = facilitator.verify(&payload, &requirement()).await.unwrap();
        assert_eq!(
            verdict.invalid_reason.as_deref(),
            Some("Payment amount below required")
        );
    }

    #[tokio::test]
    async fn unknown_transaction_is_rejected() {
        let (_, fhe, facilitator) = setup();
        let payload = build_payload(&requirement(), B256::repeat_byte(0x77), signature(&fhe).await);

        let verdict = facilitator.verify(&payload, &requirement()).await.unwrap();
        assert_eq!(verdict.invalid_reason.as_deref(), Some("Transaction not found"));
    }

    #[tokio::test]
    async fn transfer_to_someone_else_is_rejected() {
        let (gateway, fhe, facilitator) = setup();
        let encrypted = fhe
            .encrypt(U256::from(1_000_000u64), crate::DEFAULT_TOKEN)
            .await
            .unwrap();
        let tx = gateway
            .transfer(Address::repeat_byte(0xbb), encrypted.handle, encrypted.proof)
            .await
            .unwrap();
        let payload = build_payload(&requirement(), tx, signature(&fhe).await);

        let verdict = facilitator.verify(&payload, &requirement()).await.unwrap();
        assert!(!verdict.is_valid);
    }

    #[tokio::test]
    async fn reverted_transaction_is_rejected() {
        let (gateway, fhe, facilitator) = setup();
        let tx = B256::repeat_byte(0x55);
        gateway.insert_transaction(ConfirmedTransaction {
            tx_hash: tx,
            succeeded: false,
            transfers: vec![ConfidentialTransferEvent {
                token: crate::DEFAULT_TOKEN,
                from: PAYER,
                to: MERCHANT,
                amount: B256::repeat_byte(0x01),
            }],
        });
        let payload = build_payload(&requirement(), tx, signature(&fhe).await);

        let verdict = facilitator.verify(&payload, &requirement()).await.unwrap();
        assert_eq!(verdict.invalid_reason.as_deref(), Some("Transaction reverted"));
    }

    #[tokio::test]
    async fn expired_signature_is_rejected() {
        let (gateway, fhe, facilitator) = setup();
        let tx = pay(&gateway, &fhe, 1_000_000).await;
        let mut sig = signature(&fhe).await;
        sig.start_timestamp = 1;
        let payload = build_payload(&requirement(), tx, sig);

        let verdict = facilitator.verify(&payload, &requirement()).await.unwrap();
        assert!(!verdict.is_valid);
    }

    #[tokio::test]
    async fn identity_mismatches_are_rejected() {
        let (gateway, fhe, facilitator) = setup();
        let tx = pay(&gateway, &fhe, 1_000_000).await;
        let sig = signature(&fhe).await;

        let mut wrong_version = build_payload(&requirement(), tx, sig.clone());
        wrong_version.x402_version = 2;
        let mut foreign_chain = requirement();
        foreign_chain.chain_id = 1;
        let mut foreign_scheme = build_payload(&requirement(), tx, sig.clone());
        foreign_scheme.scheme = "exact".to_string();

        for (payload, req) in [
            (wrong_version, requirement()),
            (build_payload(&foreign_chain, tx, sig), foreign_chain),
            (foreign_scheme, requirement()),
        ] {
            let verdict = facilitator.verify(&payload, &req).await.unwrap();
            assert!(!verdict.is_valid);
        }
    }

    #[tokio::test]
    async fn token_allowlist_is_enforced() {
        let (gateway, fhe, facilitator) = setup();
        let facilitator = facilitator.with_accepted_tokens(vec![Address::repeat_byte(0x99)]);
        let tx = pay(&gateway, &fhe, 1_000_000).await;
        let payload = build_payload(&requirement(), tx, signature(&fhe).await);

        let verdict = facilitator.verify(&payload, &requirement()).await.unwrap();
        assert_eq!(
            verdict.invalid_reason.as_deref(),
            Some("Token not in facilitator's accepted token list")
        );
    }

    #[tokio::test]
    async fn health_reports_chain_head() {
        let (gateway, _, facilitator) = setup();
        gateway.set_chain_head(42);
        let health = facilitator.health().await.unwrap();
        assert!(health.is_ok());
        assert_eq!(health.details["blockNumber"], 42);
    }
}
