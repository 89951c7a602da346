//! # plasma-providers
//!
//! Capability traits for the client's external collaborators: the anchor
//! chain contract, the operator, and the wallet signer. Transports are
//! out of scope here - implementations plug in behind these traits, and
//! deterministic mocks back the test suites and the node's dev mode.
//!
//! Every operation a variant genuinely does not support returns
//! [`ProviderError::Unsupported`] rather than silently succeeding.

mod error;
mod event;
mod mock;

pub use error::{ProviderError, ProviderResult};
pub use event::AnchorEvent;
pub use mock::{MockAnchorClient, MockOperatorClient, MockSigner};

use async_trait::async_trait;
use num_bigint::BigUint;
use plasma_proof::{Transaction, TransactionProof};
use plasma_state::{Address, StateObject};

/// Receipt for a transaction submitted to the anchor chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorReceipt {
    /// Anchor transaction hash.
    pub transaction_hash: [u8; 32],
    /// Anchor block the transaction landed in.
    pub block_number: u64,
}

/// A token known to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenListing {
    /// Token id.
    pub id: BigUint,
    /// Human-readable ticker.
    pub ticker: String,
}

/// Client of the anchor-chain plasma contract.
#[async_trait]
pub trait AnchorClient: Send + Sync {
    /// Current anchor chain head height.
    async fn head_block_number(&self) -> ProviderResult<u64>;

    /// Contract events named `name` in the inclusive block range
    /// `[from, to]`.
    async fn events(&self, name: &str, from: u64, to: u64) -> ProviderResult<Vec<AnchorEvent>>;

    /// Whether the contract recognises `deposit` as a real deposit.
    async fn deposit_valid(&self, deposit: &StateObject) -> ProviderResult<bool>;

    /// Deployed bytecode at a predicate address.
    async fn contract_bytecode(&self, address: Address) -> ProviderResult<Vec<u8>>;

    /// Challenge period of the plasma contract, in anchor blocks.
    async fn challenge_period(&self) -> ProviderResult<u64>;

    /// Start an exit for a range.
    async fn start_exit(
        &self,
        owner: Address,
        token: &BigUint,
        start: &BigUint,
        end: &BigUint,
    ) -> ProviderResult<AnchorReceipt>;

    /// Finalise a completed exit.
    async fn finalize_exit(
        &self,
        exit_id: &BigUint,
        exitable_end: &BigUint,
        owner: Address,
    ) -> ProviderResult<AnchorReceipt>;

    /// Submit a block root commitment.
    async fn submit_block(&self, root: [u8; 32]) -> ProviderResult<AnchorReceipt>;

    /// Deposit coins into the plasma chain.
    async fn deposit(
        &self,
        owner: Address,
        token: &BigUint,
        amount: &BigUint,
    ) -> ProviderResult<AnchorReceipt>;

    /// Anchor-chain balance of an account.
    async fn balance(&self, address: Address) -> ProviderResult<BigUint>;

    /// Liveness probe.
    async fn is_online(&self) -> bool;
}

/// Client of the plasma operator.
#[async_trait]
pub trait OperatorClient: Send + Sync {
    /// Encoded transactions received by `address` in plasma blocks
    /// `[start, end]`.
    async fn received_transactions(
        &self,
        address: Address,
        start: &BigUint,
        end: &BigUint,
    ) -> ProviderResult<Vec<Vec<u8>>>;

    /// The decoded transaction and its history proof for an encoded
    /// transaction.
    async fn transaction_proof(
        &self,
        encoded: &[u8],
    ) -> ProviderResult<(Transaction, TransactionProof)>;

    /// Forward an encoded transaction to the operator.
    async fn send_transaction(&self, encoded: &[u8]) -> ProviderResult<String>;

    /// The block the operator will commit next.
    async fn next_block_number(&self) -> ProviderResult<BigUint>;

    /// The most recently committed plasma block.
    async fn current_block_number(&self) -> ProviderResult<BigUint>;

    /// Resolve a ticker to a token id.
    async fn token_id(&self, ticker: &str) -> ProviderResult<BigUint>;

    /// All tokens the operator lists.
    async fn list_tokens(&self) -> ProviderResult<Vec<TokenListing>>;

    /// Liveness probe.
    async fn is_online(&self) -> bool;
}

/// Wallet signing abstraction.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Managed accounts.
    async fn accounts(&self) -> ProviderResult<Vec<Address>>;

    /// Create a fresh account.
    async fn create_account(&self) -> ProviderResult<Address>;

    /// Sign a message with an account's key.
    async fn sign(&self, address: Address, message: &[u8]) -> ProviderResult<Vec<u8>>;
}
