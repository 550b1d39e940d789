//! In-memory [`FheCapability`] and [`ConfidentialTokenGateway`] doubles.
//!
//! "Ciphertexts" are opaque handles into a plaintext table shared by every
//! clone of a [`MockFhe`], so a gateway, a wallet and a facilitator built
//! from clones of the same instance see the same encrypted world.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use alloy::primitives::{keccak256, Address, Bytes, TxHash, B256, U256};

use crate::payment::{unix_now, CiphertextHandle, DecryptionSignature, EncryptedAmount};
use crate::scheme::{
    ConfidentialTokenGateway, ConfidentialTransferEvent, ConfirmedTransaction, FheCapability,
};
use crate::X402Error;

#[derive(Debug)]
struct FheState {
    plaintexts: HashMap<CiphertextHandle, U256>,
    next_handle: u64,
    signature_prompts: usize,
    require_signature: bool,
    fail_encrypt: bool,
    reject_signature: bool,
}

/// Deterministic FHE stand-in. Decryption requires a signature unless
/// disabled with [`MockFhe::without_signature_requirement`].
#[derive(Debug, Clone)]
pub struct MockFhe {
    state: Arc<Mutex<FheState>>,
}

impl Default for MockFhe {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFhe {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FheState {
                plaintexts: HashMap::new(),
                next_handle: 1,
                signature_prompts: 0,
                require_signature: true,
                fail_encrypt: false,
                reject_signature: false,
            })),
        }
    }

    pub fn without_signature_requirement(self) -> Self {
        self.state().require_signature = false;
        self
    }

    /// Make every `encrypt` call fail.
    pub fn set_fail_encrypt(&self, fail: bool) {
        self.state().fail_encrypt = fail;
    }

    /// Simulate the user declining the signing prompt.
    pub fn set_reject_signature(&self, reject: bool) {
        self.state().reject_signature = reject;
    }

    /// How many times a signature was requested from the user.
    pub fn signature_prompts(&self) -> usize {
        self.state().signature_prompts
    }

    /// Store `value` under a fresh handle.
    pub fn register(&self, value: U256) -> CiphertextHandle {
        let mut state = self.state();
        let handle = B256::from(U256::from(state.next_handle).to_be_bytes::<32>());
        state.next_handle += 1;
        state.plaintexts.insert(handle, value);
        handle
    }

    /// Plaintext behind `handle`, bypassing authorization.
    pub fn plaintext(&self, handle: &CiphertextHandle) -> Option<U256> {
        self.state().plaintexts.get(handle).copied()
    }

    fn state(&self) -> MutexGuard<'_, FheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FheCapability for MockFhe {
    async fn requires_signature(
        &self,
        _handle: &CiphertextHandle,
        _asset: Address,
    ) -> Result<bool, X402Error> {
        Ok(self.state().require_signature)
    }

    async fn create_decryption_signature(
        &self,
        user: Address,
        assets: &[Address],
        duration_days: u32,
    ) -> Result<DecryptionSignature, X402Error> {
        let mut state = self.state();
        state.signature_prompts += 1;
        if state.reject_signature {
            return Err(X402Error::DecryptionFailed(
                "user rejected the signature request".to_string(),
            ));
        }
        Ok(DecryptionSignature {
            signature: format!("0x{:064x}", state.signature_prompts),
            public_key: format!("0x{}", alloy::hex::encode(user)),
            user_address: user,
            contract_addresses: assets.to_vec(),
            start_timestamp: unix_now(),
            duration_days,
        })
    }

    async fn decrypt(
        &self,
        handle: &CiphertextHandle,
        asset: Address,
        signature: Option<&DecryptionSignature>,
    ) -> Result<U256, X402Error> {
        let state = self.state();
        if state.require_signature
            && !signature.is_some_and(|sig| sig.authorizes(asset, unix_now()))
        {
            return Err(X402Error::SignatureRequired);
        }
        state
            .plaintexts
            .get(handle)
            .copied()
            .ok_or_else(|| X402Error::DecryptionFailed(format!("unknown ciphertext {handle}")))
    }

    async fn encrypt(&self, amount: U256, _asset: Address) -> Result<EncryptedAmount, X402Error> {
        if self.state().fail_encrypt {
            return Err(X402Error::EncryptionFailed(
                "relayer rejected the input".to_string(),
            ));
        }
        Ok(EncryptedAmount {
            handle: self.register(amount),
            proof: Bytes::from_static(b"mock-input-proof"),
        })
    }
}

#[derive(Debug, Default)]
struct Ledger {
    balances: HashMap<Address, U256>,
    balance_handles: HashMap<Address, CiphertextHandle>,
    transactions: HashMap<TxHash, ConfirmedTransaction>,
    submitted: Vec<TxHash>,
    chain_head: u64,
    fail_transfer: bool,
}

/// ERC-7984 token held in memory. Like the real contract, a transfer larger
/// than the sender's balance succeeds but moves zero.
#[derive(Debug, Clone)]
pub struct MockTokenGateway {
    token: Address,
    account: Address,
    fhe: MockFhe,
    ledger: Arc<Mutex<Ledger>>,
}

impl MockTokenGateway {
    /// Gateway sending from `account`.
    pub fn new(token: Address, account: Address, fhe: MockFhe) -> Self {
        Self {
            token,
            account,
            fhe,
            ledger: Arc::new(Mutex::new(Ledger {
                chain_head: 1,
                ..Ledger::default()
            })),
        }
    }

    /// Same ledger, sending from another account.
    pub fn for_account(&self, account: Address) -> Self {
        Self {
            account,
            ..self.clone()
        }
    }

    pub fn mint(&self, account: Address, amount: U256) {
        let mut ledger = self.ledger();
        let balance = ledger.balances.entry(account).or_default();
        *balance += amount;
        let balance = *balance;
        let handle = self.fhe.register(balance);
        ledger.balance_handles.insert(account, handle);
    }

    pub fn balance_of(&self, account: Address) -> U256 {
        self.ledger()
            .balances
            .get(&account)
            .copied()
            .unwrap_or_default()
    }

    /// Record an arbitrary mined transaction.
    pub fn insert_transaction(&self, tx: ConfirmedTransaction) {
        self.ledger().transactions.insert(tx.tx_hash, tx);
    }

    pub fn set_chain_head(&self, block: u64) {
        self.ledger().chain_head = block;
    }

    /// Make every `transfer` submission fail.
    pub fn set_fail_transfer(&self, fail: bool) {
        self.ledger().fail_transfer = fail;
    }

    /// Hashes of transfers submitted through any clone, in order.
    pub fn submitted(&self) -> Vec<TxHash> {
        self.ledger().submitted.clone()
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConfidentialTokenGateway for MockTokenGateway {
    fn asset(&self) -> Address {
        self.token
    }

    async fn read_balance_handle(&self, account: Address) -> Option<CiphertextHandle> {
        self.ledger().balance_handles.get(&account).copied()
    }

    async fn transfer(
        &self,
        to: Address,
        handle: CiphertextHandle,
        _proof: Bytes,
    ) -> Result<TxHash, X402Error> {
        let requested = self.fhe.plaintext(&handle).ok_or_else(|| {
            X402Error::TransferFailed(format!("unknown input ciphertext {handle}"))
        })?;

        let mut ledger = self.ledger();
        if ledger.fail_transfer {
            return Err(X402Error::TransferFailed(
                "execution reverted: mock transfer disabled".to_string(),
            ));
        }

        let available = ledger
            .balances
            .get(&self.account)
            .copied()
            .unwrap_or_default();
        let moved = if available >= requested {
            requested
        } else {
            U256::ZERO
        };
        let sender_balance = available - moved;
        let recipient_balance = ledger.balances.get(&to).copied().unwrap_or_default() + moved;
        ledger.balances.insert(self.account, sender_balance);
        ledger.balances.insert(to, recipient_balance);
        let sender_handle = self.fhe.register(sender_balance);
        let recipient_handle = self.fhe.register(recipient_balance);
        ledger.balance_handles.insert(self.account, sender_handle);
        ledger.balance_handles.insert(to, recipient_handle);

        let tx_hash = keccak256(format!(
            "mock-transfer-{}-{}",
            self.token,
            ledger.submitted.len()
        ));
        ledger.submitted.push(tx_hash);
        ledger.chain_head += 1;
        ledger.transactions.insert(
            tx_hash,
            ConfirmedTransaction {
                tx_hash,
                succeeded: true,
                transfers: vec![ConfidentialTransferEvent {
                    token: self.token,
                    from: self.account,
                    to,
                    amount: self.fhe.register(moved),
                }],
            },
        );
        Ok(tx_hash)
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<(), X402Error> {
        match self.ledger().transactions.get(&tx_hash) {
            Some(tx) if tx.succeeded => Ok(()),
            Some(_) => Err(X402Error::TransferFailed(format!(
                "transaction {tx_hash} reverted"
            ))),
            None => Err(X402Error::ChainError(format!(
                "transaction {tx_hash} not found"
            ))),
        }
    }

    async fn confirmed_transaction(
        &self,
        tx_hash: TxHash,
    ) -> Result<Option<ConfirmedTransaction>, X402Error> {
        Ok(self.ledger().transactions.get(&tx_hash).cloned())
    }

    async fn chain_head(&self) -> Result<u64, X402Error> {
        Ok(self.ledger().chain_head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: Address = Address::repeat_byte(0x70);
    const ALICE: Address = Address::repeat_byte(0x01);
    const BOB: Address = Address::repeat_byte(0x02);

    #[tokio::test]
    async fn decrypt_needs_a_covering_signature() {
        let fhe = MockFhe::new();
        let handle = fhe.register(U256::from(7u64));
        assert!(matches!(
            fhe.decrypt(&handle, TOKEN, None).await,
            Err(X402Error::SignatureRequired)
        ));

        let other = fhe
            .create_decryption_signature(ALICE, &[BOB], 1)
            .await
            .unwrap();
        assert!(fhe.decrypt(&handle, TOKEN, Some(&other)).await.is_err());

        let sig = fhe
            .create_decryption_signature(ALICE, &[TOKEN], 1)
            .await
            .unwrap();
        assert_eq!(
            fhe.decrypt(&handle, TOKEN, Some(&sig)).await.unwrap(),
            U256::from(7u64)
        );
        assert_eq!(fhe.signature_prompts(), 2);
    }

    #[tokio::test]
    async fn overdrawn_transfer_moves_nothing() {
        let fhe = MockFhe::new().without_signature_requirement();
        let gateway = MockTokenGateway::new(TOKEN, ALICE, fhe.clone());
        gateway.mint(ALICE, U256::from(10u64));

        let input = fhe.encrypt(U256::from(11u64), TOKEN).await.unwrap();
        let tx = gateway.transfer(BOB, input.handle, input.proof).await.unwrap();
        gateway.wait_for_confirmation(tx).await.unwrap();

        assert_eq!(gateway.balance_of(ALICE), U256::from(10u64));
        assert_eq!(gateway.balance_of(BOB), U256::ZERO);
        let mined = gateway.confirmed_transaction(tx).await.unwrap().unwrap();
        assert_eq!(fhe.plaintext(&mined.transfers[0].amount), Some(U256::ZERO));
    }

    #[tokio::test]
    async fn clones_share_the_ledger() {
        let fhe = MockFhe::new().without_signature_requirement();
        let alice = MockTokenGateway::new(TOKEN, ALICE, fhe.clone());
        let bob = alice.for_account(BOB);
        alice.mint(ALICE, U256::from(5u64));

        let input = fhe.encrypt(U256::from(5u64), TOKEN).await.unwrap();
        alice.transfer(BOB, input.handle, input.proof).await.unwrap();

        let handle = bob.read_balance_handle(BOB).await.unwrap();
        assert_eq!(fhe.decrypt(&handle, TOKEN, None).await.unwrap(), U256::from(5u64));
        assert_eq!(bob.submitted().len(), 1);
    }
}
