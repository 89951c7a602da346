//! Exit records.

use crate::{ChainError, ChainResult};
use num_bigint::BigUint;
use plasma_state::codec::{read_biguint, write_biguint};
use plasma_state::Address;

/// A started exit observed on the anchor chain.
///
/// Exits are append-only: once recorded they are never deleted, only
/// marked finalised. Whether an exit is past its challenge period is
/// derived from the current anchor height, not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exit {
    /// Contract-assigned exit id.
    pub id: BigUint,
    /// Exiting account.
    pub owner: Address,
    /// Token the range is denominated in.
    pub token: BigUint,
    /// Inclusive lower bound of the exited range.
    pub start: BigUint,
    /// Exclusive upper bound of the exited range.
    pub end: BigUint,
    /// Anchor block the exit was started at.
    pub block: BigUint,
}

impl Exit {
    /// Serialize the exit.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        write_biguint(&mut bytes, &self.id);
        bytes.extend_from_slice(self.owner.as_bytes());
        write_biguint(&mut bytes, &self.token);
        write_biguint(&mut bytes, &self.start);
        write_biguint(&mut bytes, &self.end);
        write_biguint(&mut bytes, &self.block);
        bytes
    }

    /// Deserialize an exit, returning it and the bytes consumed.
    pub fn decode_from(bytes: &[u8]) -> ChainResult<(Self, usize)> {
        let mut offset = 0;
        let id = read_biguint(bytes, &mut offset)?;
        if offset + 20 > bytes.len() {
            return Err(ChainError::InvalidInput(
                "Exit truncated at owner".to_string(),
            ));
        }
        let owner = Address::from_slice(&bytes[offset..offset + 20])?;
        offset += 20;
        let token = read_biguint(bytes, &mut offset)?;
        let start = read_biguint(bytes, &mut offset)?;
        let end = read_biguint(bytes, &mut offset)?;
        let block = read_biguint(bytes, &mut offset)?;
        Ok((
            Self {
                id,
                owner,
                token,
                start,
                end,
                block,
            },
            offset,
        ))
    }

    /// Whether the challenge period has elapsed at `anchor_head`.
    pub fn completed(&self, challenge_period: u64, anchor_head: u64) -> bool {
        &self.block + BigUint::from(challenge_period) < BigUint::from(anchor_head)
    }
}

/// An exit together with its derived and persisted status flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitRecord {
    /// The exit itself.
    pub exit: Exit,
    /// Challenge period elapsed.
    pub completed: bool,
    /// Finalisation mark persisted.
    pub finalized: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exit() -> Exit {
        Exit {
            id: BigUint::from(7u8),
            owner: Address::new([3; 20]),
            token: BigUint::from(0u8),
            start: BigUint::from(10u8),
            end: BigUint::from(90u8),
            block: BigUint::from(100u8),
        }
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let original = exit();
        let encoded = original.encode();
        let (decoded, consumed) = Exit::decode_from(&encoded).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn test_completed_is_strict() {
        let exit = exit();
        // block 100, challenge period 20: completed only past block 120.
        assert!(!exit.completed(20, 120));
        assert!(exit.completed(20, 121));
    }
}
