//! Deterministic mock providers.
//!
//! The mocks are scriptable versions of the provider traits used by the
//! test suites and by the node's dev mode. They keep everything in memory
//! and record the calls that matter for assertions.

use crate::{
    AnchorClient, AnchorEvent, AnchorReceipt, OperatorClient, ProviderError, ProviderResult,
    TokenListing, WalletSigner,
};
use async_trait::async_trait;
use num_bigint::BigUint;
use parking_lot::RwLock;
use plasma_proof::{keccak256, Transaction, TransactionProof};
use plasma_state::{Address, StateObject};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

fn receipt(seed: &AtomicU64) -> AnchorReceipt {
    let n = seed.fetch_add(1, Ordering::SeqCst);
    AnchorReceipt {
        transaction_hash: keccak256(&n.to_be_bytes()),
        block_number: n,
    }
}

/// Scriptable in-memory anchor chain.
#[derive(Default)]
pub struct MockAnchorClient {
    head: AtomicU64,
    challenge_period: AtomicU64,
    online: AtomicBool,
    events: RwLock<Vec<AnchorEvent>>,
    rejected_deposits: RwLock<Vec<(BigUint, BigUint)>>,
    bytecode: RwLock<HashMap<Address, Vec<u8>>>,
    balances: RwLock<HashMap<Address, BigUint>>,
    receipt_seed: AtomicU64,
    finalized_exits: RwLock<Vec<(BigUint, BigUint, Address)>>,
    started_exits: RwLock<Vec<(Address, BigUint, BigUint, BigUint)>>,
    submitted_roots: RwLock<Vec<[u8; 32]>>,
}

impl MockAnchorClient {
    /// Create a mock anchor at head height 0.
    pub fn new() -> Self {
        let mock = Self::default();
        mock.online.store(true, Ordering::SeqCst);
        mock.challenge_period.store(20, Ordering::SeqCst);
        mock
    }

    /// Set the current head height.
    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    /// Set the challenge period.
    pub fn set_challenge_period(&self, blocks: u64) {
        self.challenge_period.store(blocks, Ordering::SeqCst);
    }

    /// Toggle the liveness probe.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Script an event.
    pub fn push_event(&self, event: AnchorEvent) {
        self.events.write().push(event);
    }

    /// Mark a deposit range as not recognised by the contract.
    pub fn reject_deposit(&self, start: BigUint, end: BigUint) {
        self.rejected_deposits.write().push((start, end));
    }

    /// Recognise every deposit again.
    pub fn clear_rejected_deposits(&self) {
        self.rejected_deposits.write().clear();
    }

    /// Script deployed bytecode.
    pub fn set_bytecode(&self, address: Address, code: Vec<u8>) {
        self.bytecode.write().insert(address, code);
    }

    /// Script an account balance.
    pub fn set_balance(&self, address: Address, balance: BigUint) {
        self.balances.write().insert(address, balance);
    }

    /// Exits finalised through this mock, in call order.
    pub fn finalized_exits(&self) -> Vec<(BigUint, BigUint, Address)> {
        self.finalized_exits.read().clone()
    }

    /// Exits started through this mock, in call order.
    pub fn started_exits(&self) -> Vec<(Address, BigUint, BigUint, BigUint)> {
        self.started_exits.read().clone()
    }

    /// Roots submitted through this mock.
    pub fn submitted_roots(&self) -> Vec<[u8; 32]> {
        self.submitted_roots.read().clone()
    }

    fn ensure_online(&self) -> ProviderResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::AnchorOffline)
        }
    }
}

#[async_trait]
impl AnchorClient for MockAnchorClient {
    async fn head_block_number(&self) -> ProviderResult<u64> {
        self.ensure_online()?;
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn events(&self, name: &str, from: u64, to: u64) -> ProviderResult<Vec<AnchorEvent>> {
        self.ensure_online()?;
        let mut matched: Vec<AnchorEvent> = self
            .events
            .read()
            .iter()
            .filter(|e| e.name == name && e.block_number >= from && e.block_number <= to)
            .cloned()
            .collect();
        matched.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(matched)
    }

    async fn deposit_valid(&self, deposit: &StateObject) -> ProviderResult<bool> {
        self.ensure_online()?;
        let rejected = self
            .rejected_deposits
            .read()
            .iter()
            .any(|(start, end)| *start == deposit.start && *end == deposit.end);
        Ok(!rejected)
    }

    async fn contract_bytecode(&self, address: Address) -> ProviderResult<Vec<u8>> {
        self.ensure_online()?;
        self.bytecode
            .read()
            .get(&address)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("bytecode at {}", address)))
    }

    async fn challenge_period(&self) -> ProviderResult<u64> {
        self.ensure_online()?;
        Ok(self.challenge_period.load(Ordering::SeqCst))
    }

    async fn start_exit(
        &self,
        owner: Address,
        token: &BigUint,
        start: &BigUint,
        end: &BigUint,
    ) -> ProviderResult<AnchorReceipt> {
        self.ensure_online()?;
        self.started_exits
            .write()
            .push((owner, token.clone(), start.clone(), end.clone()));
        Ok(receipt(&self.receipt_seed))
    }

    async fn finalize_exit(
        &self,
        exit_id: &BigUint,
        exitable_end: &BigUint,
        owner: Address,
    ) -> ProviderResult<AnchorReceipt> {
        self.ensure_online()?;
        self.finalized_exits
            .write()
            .push((exit_id.clone(), exitable_end.clone(), owner));
        Ok(receipt(&self.receipt_seed))
    }

    async fn submit_block(&self, root: [u8; 32]) -> ProviderResult<AnchorReceipt> {
        self.ensure_online()?;
        self.submitted_roots.write().push(root);
        Ok(receipt(&self.receipt_seed))
    }

    async fn deposit(
        &self,
        _owner: Address,
        _token: &BigUint,
        _amount: &BigUint,
    ) -> ProviderResult<AnchorReceipt> {
        self.ensure_online()?;
        Ok(receipt(&self.receipt_seed))
    }

    async fn balance(&self, address: Address) -> ProviderResult<BigUint> {
        self.ensure_online()?;
        Ok(self
            .balances
            .read()
            .get(&address)
            .cloned()
            .unwrap_or_default())
    }

    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Scriptable in-memory operator.
#[derive(Default)]
pub struct MockOperatorClient {
    online: AtomicBool,
    inbox: RwLock<HashMap<Address, Vec<(BigUint, Vec<u8>)>>>,
    proofs: RwLock<HashMap<Vec<u8>, (Transaction, TransactionProof)>>,
    sent: RwLock<Vec<Vec<u8>>>,
    next_block: RwLock<BigUint>,
    current_block: RwLock<BigUint>,
    tokens: RwLock<Vec<TokenListing>>,
}

impl MockOperatorClient {
    /// Create an online mock operator.
    pub fn new() -> Self {
        let mock = Self::default();
        mock.online.store(true, Ordering::SeqCst);
        mock
    }

    /// Toggle the liveness probe.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Script a received transaction for an account at a plasma block.
    pub fn push_received(&self, address: Address, block: BigUint, encoded: Vec<u8>) {
        self.inbox
            .write()
            .entry(address)
            .or_default()
            .push((block, encoded));
    }

    /// Script the proof bundle served for an encoded transaction.
    pub fn set_proof(&self, encoded: Vec<u8>, transaction: Transaction, proof: TransactionProof) {
        self.proofs.write().insert(encoded, (transaction, proof));
    }

    /// Set the operator block counters.
    pub fn set_blocks(&self, current: BigUint, next: BigUint) {
        *self.current_block.write() = current;
        *self.next_block.write() = next;
    }

    /// Register a token listing.
    pub fn add_token(&self, id: BigUint, ticker: impl Into<String>) {
        self.tokens.write().push(TokenListing {
            id,
            ticker: ticker.into(),
        });
    }

    /// Encoded transactions forwarded through this mock.
    pub fn sent_transactions(&self) -> Vec<Vec<u8>> {
        self.sent.read().clone()
    }

    fn ensure_online(&self) -> ProviderResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::OperatorOffline)
        }
    }
}

#[async_trait]
impl OperatorClient for MockOperatorClient {
    async fn received_transactions(
        &self,
        address: Address,
        start: &BigUint,
        end: &BigUint,
    ) -> ProviderResult<Vec<Vec<u8>>> {
        self.ensure_online()?;
        Ok(self
            .inbox
            .read()
            .get(&address)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(block, _)| block >= start && block <= end)
                    .map(|(_, encoded)| encoded.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn transaction_proof(
        &self,
        encoded: &[u8],
    ) -> ProviderResult<(Transaction, TransactionProof)> {
        self.ensure_online()?;
        self.proofs
            .read()
            .get(encoded)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound("transaction proof".to_string()))
    }

    async fn send_transaction(&self, encoded: &[u8]) -> ProviderResult<String> {
        self.ensure_online()?;
        self.sent.write().push(encoded.to_vec());
        Ok(hex::encode(keccak256(encoded)))
    }

    async fn next_block_number(&self) -> ProviderResult<BigUint> {
        self.ensure_online()?;
        Ok(self.next_block.read().clone())
    }

    async fn current_block_number(&self) -> ProviderResult<BigUint> {
        self.ensure_online()?;
        Ok(self.current_block.read().clone())
    }

    async fn token_id(&self, ticker: &str) -> ProviderResult<BigUint> {
        self.ensure_online()?;
        self.tokens
            .read()
            .iter()
            .find(|t| t.ticker == ticker)
            .map(|t| t.id.clone())
            .ok_or_else(|| ProviderError::NotFound(format!("token {}", ticker)))
    }

    async fn list_tokens(&self) -> ProviderResult<Vec<TokenListing>> {
        self.ensure_online()?;
        Ok(self.tokens.read().clone())
    }

    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Deterministic in-memory signer.
///
/// Accounts derive from a counter and signatures are keccak digests; real
/// key management and signature schemes live outside the state core.
#[derive(Default)]
pub struct MockSigner {
    accounts: RwLock<Vec<Address>>,
    counter: AtomicU64,
}

impl MockSigner {
    /// Create a signer with no accounts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a signer pre-seeded with `count` accounts.
    pub fn with_accounts(count: usize) -> Self {
        let signer = Self::new();
        for _ in 0..count {
            let _ = signer.derive_account();
        }
        signer
    }

    fn derive_account(&self) -> Address {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let digest = keccak256(&n.to_be_bytes());
        let address = Address::from_slice(&digest[..20]).expect("digest is wide enough");
        self.accounts.write().push(address);
        address
    }
}

#[async_trait]
impl WalletSigner for MockSigner {
    async fn accounts(&self) -> ProviderResult<Vec<Address>> {
        Ok(self.accounts.read().clone())
    }

    async fn create_account(&self) -> ProviderResult<Address> {
        Ok(self.derive_account())
    }

    async fn sign(&self, address: Address, message: &[u8]) -> ProviderResult<Vec<u8>> {
        if !self.accounts.read().contains(&address) {
            return Err(ProviderError::NotFound(format!("account {}", address)));
        }
        let mut data = Vec::with_capacity(20 + message.len());
        data.extend_from_slice(address.as_bytes());
        data.extend_from_slice(message);
        let digest = keccak256(&data);

        let mut signature = Vec::with_capacity(65);
        signature.extend_from_slice(&digest);
        signature.extend_from_slice(&digest);
        signature.push(0x1b);
        Ok(signature)
    }
}
