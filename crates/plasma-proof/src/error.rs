//! Error types for proof verification.

use plasma_state::{Address, StateError};
use thiserror::Error;

/// Proof verification errors.
///
/// The first five variants are the precise failure classes surfaced to
/// callers of proof application; each one isolates a single offending
/// deposit, inclusion proof or transition.
#[derive(Error, Debug)]
pub enum ProofError {
    /// A deposit in the proof bundle was not recognised by the anchor
    /// chain.
    #[error("Invalid deposit: {0}")]
    InvalidDeposit(String),

    /// A sum-tree inclusion proof failed to verify.
    #[error("Invalid inclusion proof: {0}")]
    InvalidInclusion(String),

    /// A state transition was rejected by its predicate, or the target
    /// state did not materialise.
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// No block root is stored for a referenced plasma block.
    #[error("Missing block root for block {0}")]
    MissingBlockRoot(String),

    /// Predicate bytecode could not be found locally or on the anchor
    /// chain.
    #[error("Unknown predicate {0}")]
    UnknownPredicate(Address),

    /// Malformed encoded material.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// State engine error.
    #[error(transparent)]
    State(#[from] StateError),
}

/// Result type for proof operations.
pub type ProofResult<T> = Result<T, ProofError>;
