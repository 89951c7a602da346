//! # plasma-chain
//!
//! The chain side of the plasma client:
//! - [`ChainStore`]: the logical key/value schema over the storage
//!   backend (transactions, headers, exits, exitable ends, predicate
//!   bytecode, head state)
//! - [`SyncCursorStore`]: per-event anchor cursors, the seen-event set
//!   and the failed-import retry queue
//! - [`ProofVerifier`]: validates transaction history proofs against
//!   block commitments and predicate rules
//! - [`ChainService`]: the public facade applying deposits, exits and
//!   proven transitions to the authoritative head state
//!
//! Head-state mutation is serialised by a named mutex: every writer
//! acquires the `state` lock, loads, mutates and persists before
//! releasing, so the head either moves whole or not at all.

mod cursor;
mod error;
mod exit;
mod locks;
mod service;
mod store;
mod verifier;

pub use cursor::SyncCursorStore;
pub use error::{ChainError, ChainResult};
pub use exit::{Exit, ExitRecord};
pub use locks::KeyedLocks;
pub use service::ChainService;
pub use store::{typed_value, ChainStore, STATE_LOCK};
pub use verifier::ProofVerifier;
