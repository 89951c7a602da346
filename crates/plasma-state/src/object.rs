//! State objects over the coin space.

use crate::address::ADDRESS_LENGTH;
use crate::codec::{read_biguint, write_biguint};
use crate::range_store::RangeItem;
use crate::{Address, StateError, StateResult};
use num_bigint::BigUint;
use num_traits::Zero;

/// A contiguous slice of the coin space held under a predicate.
///
/// The five core fields (`start`, `end`, `block`, `predicate`, `state`)
/// define the object; equality is pointwise over exactly those fields.
/// The implicit fields are transient verification metadata derived from
/// sum-tree inclusion proofs and are neither encoded nor compared.
#[derive(Debug, Clone)]
pub struct StateObject {
    /// Inclusive lower bound of the owned range.
    pub start: BigUint,
    /// Exclusive upper bound of the owned range.
    pub end: BigUint,
    /// Plasma block this state was created at.
    pub block: BigUint,
    /// Address of the predicate contract governing spends of this range.
    pub predicate: Address,
    /// Opaque predicate data.
    pub state: Vec<u8>,
    /// True when this object is an implicit slice of a proven transition.
    pub implicit: bool,
    /// Lower implicit bound covered by the inclusion proof, if any.
    pub implicit_start: Option<BigUint>,
    /// Upper implicit bound covered by the inclusion proof, if any.
    pub implicit_end: Option<BigUint>,
}

impl StateObject {
    /// Create a new explicit state object.
    pub fn new(
        start: impl Into<BigUint>,
        end: impl Into<BigUint>,
        block: impl Into<BigUint>,
        predicate: Address,
        state: Vec<u8>,
    ) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            block: block.into(),
            predicate,
            state,
            implicit: false,
            implicit_start: None,
            implicit_end: None,
        }
    }

    /// Length of the explicit range.
    pub fn length(&self) -> BigUint {
        if self.end > self.start {
            &self.end - &self.start
        } else {
            BigUint::zero()
        }
    }

    /// Check the structural invariants.
    ///
    /// `start < end`, and when implicit bounds are present they must
    /// bracket the explicit range.
    pub fn validate(&self) -> StateResult<()> {
        if self.start >= self.end {
            return Err(StateError::InvalidRange {
                start: self.start.to_string(),
                end: self.end.to_string(),
            });
        }
        if let Some(implicit_start) = &self.implicit_start {
            if *implicit_start > self.start {
                return Err(StateError::InvalidStateObject(format!(
                    "implicit start {} > start {}",
                    implicit_start, self.start
                )));
            }
        }
        if let Some(implicit_end) = &self.implicit_end {
            if *implicit_end < self.end {
                return Err(StateError::InvalidStateObject(format!(
                    "implicit end {} < end {}",
                    implicit_end, self.end
                )));
            }
        }
        Ok(())
    }

    /// Decompose this object into its transition components.
    ///
    /// With no implicit bounds the object itself is the only component.
    /// Otherwise the result is the non-empty left implicit slice
    /// `[implicit_start, start)`, the non-empty right implicit slice
    /// `[end, implicit_end)` and the explicit slice `[start, end)`, in
    /// that order. Implicit slices are applied as block increments rather
    /// than overwrites.
    pub fn components(&self) -> Vec<StateObject> {
        if self.implicit_start.is_none() && self.implicit_end.is_none() {
            let mut only = self.clone();
            only.implicit = false;
            return vec![only];
        }

        let implicit_start = self.implicit_start.clone().unwrap_or_else(|| self.start.clone());
        let implicit_end = self.implicit_end.clone().unwrap_or_else(|| self.end.clone());
        let mut components = Vec::with_capacity(3);

        if implicit_start < self.start {
            let mut left = self.clone();
            left.start = implicit_start;
            left.end = self.start.clone();
            left.implicit = true;
            left.implicit_start = None;
            left.implicit_end = None;
            components.push(left);
        }
        if implicit_end > self.end {
            let mut right = self.clone();
            right.start = self.end.clone();
            right.end = implicit_end;
            right.implicit = true;
            right.implicit_start = None;
            right.implicit_end = None;
            components.push(right);
        }

        let mut explicit = self.clone();
        explicit.implicit = false;
        explicit.implicit_start = None;
        explicit.implicit_end = None;
        components.push(explicit);

        components
    }

    /// Serialize the five core fields.
    ///
    /// Format: start_len (2) | start | end_len (2) | end | block_len (2) |
    /// block | predicate (20) | state_len (4) | state. Integers are
    /// big-endian with minimal length.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        write_biguint(&mut bytes, &self.start);
        write_biguint(&mut bytes, &self.end);
        write_biguint(&mut bytes, &self.block);
        bytes.extend_from_slice(self.predicate.as_bytes());
        bytes.extend_from_slice(&(self.state.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&self.state);
        bytes
    }

    /// Deserialize a state object, returning it and the bytes consumed.
    pub fn decode_from(bytes: &[u8]) -> StateResult<(Self, usize)> {
        let mut offset = 0;
        let start = read_biguint(bytes, &mut offset)?;
        let end = read_biguint(bytes, &mut offset)?;
        let block = read_biguint(bytes, &mut offset)?;

        if offset + ADDRESS_LENGTH > bytes.len() {
            return Err(StateError::Serialization(
                "State object truncated at predicate".to_string(),
            ));
        }
        let predicate = Address::from_slice(&bytes[offset..offset + ADDRESS_LENGTH])?;
        offset += ADDRESS_LENGTH;

        if offset + 4 > bytes.len() {
            return Err(StateError::Serialization(
                "State object truncated at state length".to_string(),
            ));
        }
        let state_len =
            u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
        offset += 4;
        if offset + state_len > bytes.len() {
            return Err(StateError::Serialization(
                "State object truncated at state data".to_string(),
            ));
        }
        let state = bytes[offset..offset + state_len].to_vec();
        offset += state_len;

        Ok((
            Self {
                start,
                end,
                block,
                predicate,
                state,
                implicit: false,
                implicit_start: None,
                implicit_end: None,
            },
            offset,
        ))
    }

    /// Deserialize a state object that occupies the whole slice.
    pub fn decode(bytes: &[u8]) -> StateResult<Self> {
        let (object, consumed) = Self::decode_from(bytes)?;
        if consumed != bytes.len() {
            return Err(StateError::Serialization(format!(
                "Trailing bytes after state object: {} of {}",
                consumed,
                bytes.len()
            )));
        }
        Ok(object)
    }
}

impl PartialEq for StateObject {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start
            && self.end == other.end
            && self.block == other.block
            && self.predicate == other.predicate
            && self.state == other.state
    }
}

impl Eq for StateObject {}

impl RangeItem for StateObject {
    fn range_start(&self) -> &BigUint {
        &self.start
    }

    fn range_end(&self) -> &BigUint {
        &self.end
    }

    fn range_block(&self) -> &BigUint {
        &self.block
    }

    fn with_bounds(&self, start: BigUint, end: BigUint) -> Self {
        let mut copy = self.clone();
        copy.start = start;
        copy.end = end;
        copy
    }

    fn with_block(&self, block: BigUint) -> Self {
        let mut copy = self.clone();
        copy.block = block;
        copy
    }
}
