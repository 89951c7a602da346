//! # plasma-proof
//!
//! Proof material for the plasma client:
//! - [`Transaction`] and [`TransactionProof`] with their deterministic
//!   binary encoding and keccak256 hashing
//! - Merkle sum-tree construction, inclusion verification and implicit
//!   bound derivation
//! - The [`PredicateEvaluator`] seam that decides state-transition
//!   validity, with the built-in ownership evaluator

mod error;
mod hash;
mod predicate;
mod sum_tree;
mod transaction;

pub use error::{ProofError, ProofResult};
pub use hash::keccak256;
pub use predicate::{OwnershipEvaluator, OwnershipState, PredicateEvaluator, TOKEN_TAG_BYTES};
pub use sum_tree::{InclusionProof, MerkleSumTree, SumTreeNode, SUM_BYTES};
pub use transaction::{Transaction, TransactionProof};
