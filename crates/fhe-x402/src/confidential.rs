//! [`ConfidentialTokenGateway`] over an ERC-7984 contract reached through an
//! alloy provider.

use std::time::Duration;

use alloy::primitives::{Address, Bytes, TxHash, B256};
use alloy::providers::Provider;

use crate::scheme::{ConfidentialTokenGateway, ConfidentialTransferEvent, ConfirmedTransaction};
use crate::X402Error;
use crate::IERC7984;

/// Upper bound on `send()` so an unresponsive RPC cannot hang a payment.
const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// ERC-7984 confidential token accessed via JSON-RPC.
pub struct Erc7984Gateway<P> {
    provider: P,
    token: Address,
    confirmation_timeout: Duration,
}

impl<P> Erc7984Gateway<P> {
    pub fn new(provider: P, token: Address) -> Self {
        Self {
            provider,
            token,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P> ConfidentialTokenGateway for Erc7984Gateway<P>
where
    P: Provider + Send + Sync,
{
    fn asset(&self) -> Address {
        self.token
    }

    async fn read_balance_handle(&self, account: Address) -> Option<B256> {
        let contract = IERC7984::new(self.token, &self.provider);
        match contract.confidentialBalanceOf(account).call().await {
            Ok(handle) if handle != B256::ZERO => Some(handle),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(%account, token = %self.token, error = %e, "confidentialBalanceOf failed");
                None
            }
        }
    }

    async fn transfer(&self, to: Address, handle: B256, proof: Bytes) -> Result<TxHash, X402Error> {
        let contract = IERC7984::new(self.token, &self.provider);
        let pending = tokio::time::timeout(
            SEND_TIMEOUT,
            contract.confidentialTransfer(to, handle, proof).send(),
        )
        .await
        .map_err(|_| {
            X402Error::TransferFailed("confidentialTransfer send timed out after 30s".to_string())
        })?
        .map_err(|e| X402Error::TransferFailed(format!("confidentialTransfer send failed: {e}")))?;

        let tx_hash = *pending.tx_hash();
        tracing::info!(%to, token = %self.token, tx = %tx_hash, "confidential transfer submitted");
        Ok(tx_hash)
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<(), X402Error> {
        let deadline = tokio::time::Instant::now() + self.confirmation_timeout;
        loop {
            match self.provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    if receipt.status() {
                        tracing::info!(tx = %tx_hash, "confidential transfer confirmed");
                        return Ok(());
                    }
                    return Err(X402Error::TransferFailed(format!(
                        "transaction {tx_hash} reverted"
                    )));
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(tx = %tx_hash, error = %e, "receipt lookup failed"),
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(X402Error::ChainError(format!(
                    "transaction {tx_hash} not confirmed after {}s",
                    self.confirmation_timeout.as_secs()
                )));
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }

    async fn confirmed_transaction(
        &self,
        tx_hash: TxHash,
    ) -> Result<Option<ConfirmedTransaction>, X402Error> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| X402Error::ChainError(format!("receipt lookup failed: {e}")))?;
        let Some(receipt) = receipt else {
            return Ok(None);
        };

        let transfers = receipt
            .inner
            .logs()
            .iter()
            .filter_map(|log| {
                let decoded = log.log_decode::<IERC7984::ConfidentialTransfer>().ok()?;
                let event = decoded.inner.data;
                Some(ConfidentialTransferEvent {
                    token: log.address(),
                    from: event.from,
                    to: event.to,
                    amount: event.amount,
                })
            })
            .collect();

        Ok(Some(ConfirmedTransaction {
            tx_hash,
            succeeded: receipt.status(),
            transfers,
        }))
    }

    async fn chain_head(&self) -> Result<u64, X402Error> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| X402Error::ChainError(format!("block number lookup failed: {e}")))
    }
}
