//! Error types for the chain layer.

use plasma_proof::ProofError;
use plasma_providers::ProviderError;
use plasma_state::StateError;
use plasma_storage::StorageError;
use thiserror::Error;

/// Chain layer errors.
#[derive(Error, Debug)]
pub enum ChainError {
    /// A queried entity is not stored.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Coin selection could not satisfy the requested amount.
    #[error("Insufficient balance: {missing} missing for token {token}")]
    InsufficientBalance { token: String, missing: String },

    /// Proof verification failure.
    #[error(transparent)]
    Proof(#[from] ProofError),

    /// State engine error.
    #[error(transparent)]
    State(#[from] StateError),

    /// Storage backend error.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Provider error.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
