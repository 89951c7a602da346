//! Predicate evaluation.
//!
//! A predicate is a program identified by an address whose bytecode
//! decides whether a state transition is valid given the old state, the
//! new state and a witness. The client invokes evaluation through the
//! [`PredicateEvaluator`] seam; the built-in [`OwnershipEvaluator`]
//! implements the plain ownership rules without interpreting bytecode.

use crate::{ProofError, ProofResult};
use num_bigint::BigUint;
use plasma_state::{Address, StateObject};
use tracing::trace;

/// Width of the fixed token tag inside ownership state data, in bytes.
pub const TOKEN_TAG_BYTES: usize = 8;

/// Decides the validity of state transitions.
pub trait PredicateEvaluator: Send + Sync {
    /// Evaluate a transition from `old_state` to `new_state`.
    ///
    /// Both states arrive in their encoded form, along with the spending
    /// witness and the predicate bytecode fetched for the old state's
    /// predicate address. Returns `Ok(false)` for a cleanly rejected
    /// transition and an error only for malformed inputs.
    fn valid_state_transition(
        &self,
        old_state: &[u8],
        new_state: &[u8],
        witness: &[u8],
        bytecode: &[u8],
    ) -> ProofResult<bool>;
}

/// Predicate data of the ownership predicate: who owns the range, and in
/// which token the range is denominated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipState {
    /// Owning account.
    pub owner: Address,
    /// Token the range is denominated in.
    pub token: BigUint,
}

impl OwnershipState {
    /// Create ownership data.
    pub fn new(owner: Address, token: impl Into<BigUint>) -> Self {
        Self {
            owner,
            token: token.into(),
        }
    }

    /// Serialize: owner (20) | token (8, big-endian).
    pub fn encode(&self) -> ProofResult<Vec<u8>> {
        let token_raw = self.token.to_bytes_be();
        if token_raw.len() > TOKEN_TAG_BYTES {
            return Err(ProofError::Encoding(format!(
                "Token {} exceeds {} bytes",
                self.token, TOKEN_TAG_BYTES
            )));
        }
        let mut bytes = vec![0u8; 20 + TOKEN_TAG_BYTES];
        bytes[..20].copy_from_slice(self.owner.as_bytes());
        bytes[20 + TOKEN_TAG_BYTES - token_raw.len()..].copy_from_slice(&token_raw);
        Ok(bytes)
    }

    /// Deserialize ownership data.
    pub fn decode(bytes: &[u8]) -> ProofResult<Self> {
        if bytes.len() != 20 + TOKEN_TAG_BYTES {
            return Err(ProofError::Encoding(format!(
                "Ownership state must be {} bytes, got {}",
                20 + TOKEN_TAG_BYTES,
                bytes.len()
            )));
        }
        let owner = Address::from_slice(&bytes[..20])?;
        let token = BigUint::from_bytes_be(&bytes[20..]);
        Ok(Self { owner, token })
    }
}

/// The built-in ownership evaluator.
///
/// A transition is valid when the witness names the current owner as the
/// sender and the new state sits exactly one plasma block after the old
/// one. Signature verification happens outside the state core; the
/// bytecode argument is accepted for interface parity and ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnershipEvaluator;

impl OwnershipEvaluator {
    /// Create an evaluator.
    pub fn new() -> Self {
        Self
    }
}

impl PredicateEvaluator for OwnershipEvaluator {
    fn valid_state_transition(
        &self,
        old_state: &[u8],
        new_state: &[u8],
        witness: &[u8],
        _bytecode: &[u8],
    ) -> ProofResult<bool> {
        let old = StateObject::decode(old_state)?;
        let new = StateObject::decode(new_state)?;

        let ownership = match OwnershipState::decode(&old.state) {
            Ok(ownership) => ownership,
            Err(_) => {
                trace!("Old state carries no ownership data, rejecting");
                return Ok(false);
            }
        };

        if witness.len() < 20 {
            return Ok(false);
        }
        let sender = Address::from_slice(&witness[..20])?;

        let expected_block = &old.block + 1u32;
        Ok(sender == ownership.owner && new.block == expected_block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ownership_object(owner: u8, block: u64) -> StateObject {
        let state = OwnershipState::new(Address::new([owner; 20]), 0u32)
            .encode()
            .unwrap();
        StateObject::new(0u32, 100u32, block, Address::new([0xee; 20]), state)
    }

    fn witness_for(sender: u8) -> Vec<u8> {
        let mut witness = vec![sender; 20];
        witness.extend_from_slice(&[0u8; 65]);
        witness
    }

    #[test]
    fn test_ownership_state_round_trip() {
        let state = OwnershipState::new(Address::new([5; 20]), 77u32);
        let decoded = OwnershipState::decode(&state.encode().unwrap()).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_ownership_state_rejects_wide_token() {
        let state = OwnershipState::new(Address::zero(), BigUint::from(1u8) << 70);
        assert!(state.encode().is_err());
    }

    #[test]
    fn test_valid_transition() {
        let evaluator = OwnershipEvaluator::new();
        let old = ownership_object(1, 4);
        let new = ownership_object(2, 5);
        let ok = evaluator
            .valid_state_transition(&old.encode(), &new.encode(), &witness_for(1), &[])
            .unwrap();
        assert!(ok);
    }

    #[test]
    fn test_wrong_sender_rejected() {
        let evaluator = OwnershipEvaluator::new();
        let old = ownership_object(1, 4);
        let new = ownership_object(2, 5);
        let ok = evaluator
            .valid_state_transition(&old.encode(), &new.encode(), &witness_for(3), &[])
            .unwrap();
        assert!(!ok);
    }

    #[test]
    fn test_wrong_block_rejected() {
        let evaluator = OwnershipEvaluator::new();
        let old = ownership_object(1, 4);
        for block in [4u64, 6, 7] {
            let new = ownership_object(2, block);
            let ok = evaluator
                .valid_state_transition(&old.encode(), &new.encode(), &witness_for(1), &[])
                .unwrap();
            assert!(!ok, "block {} accepted", block);
        }
    }

    #[test]
    fn test_short_witness_rejected() {
        let evaluator = OwnershipEvaluator::new();
        let old = ownership_object(1, 4);
        let new = ownership_object(2, 5);
        let ok = evaluator
            .valid_state_transition(&old.encode(), &new.encode(), &[1, 2], &[])
            .unwrap();
        assert!(!ok);
    }

    #[test]
    fn test_undecodable_state_errors() {
        let evaluator = OwnershipEvaluator::new();
        let result = evaluator.valid_state_transition(&[1, 2, 3], &[4, 5], &witness_for(1), &[]);
        assert!(result.is_err());
    }
}
