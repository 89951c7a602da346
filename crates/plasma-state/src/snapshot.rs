//! Snapshot manager over the range store.

use crate::{RangeStore, StateError, StateObject, StateResult};
use tracing::debug;

/// A mutable view of ownership over the coin space.
///
/// One instance holds the authoritative head state; proof verification
/// builds transient instances that are merged into the head once a proof
/// checks out. After every public call the underlying store holds no
/// overlapping ranges and the block at any coin position is monotonically
/// non-decreasing over successful applications.
#[derive(Debug, Clone, Default)]
pub struct SnapshotManager {
    ranges: RangeStore<StateObject>,
}

impl SnapshotManager {
    /// Create an empty snapshot manager.
    pub fn new() -> Self {
        Self {
            ranges: RangeStore::new(),
        }
    }

    /// Restore a manager from a set of ranges already known to be disjoint.
    ///
    /// Used when loading the persisted head state; ranges coming from
    /// anywhere else go through [`SnapshotManager::apply_deposit`].
    pub fn from_ranges(ranges: Vec<StateObject>) -> Self {
        let mut store = RangeStore::new();
        for range in ranges {
            store.push_unchecked(range);
        }
        Self { ranges: store }
    }

    /// Number of distinct ranges held.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Check if no ranges are held.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Defensive copy of the current range set, sorted by `(start, end)`.
    pub fn state(&self) -> Vec<StateObject> {
        self.ranges.entries().to_vec()
    }

    /// Apply a deposit.
    ///
    /// Deposits land on previously unowned coins; if one overlaps existing
    /// state (an already-exited region still in flight) the higher-block
    /// policy of the range store resolves it.
    pub fn apply_deposit(&mut self, deposit: StateObject) -> StateResult<()> {
        self.ranges.add_range(deposit)
    }

    /// Apply the post-state of a proven transition.
    ///
    /// The state object is decomposed into components: implicit slices
    /// advance the blocks of fully contained entries one block behind,
    /// the explicit slice overwrites.
    pub fn apply_transition(&mut self, new_state: &StateObject) -> StateResult<()> {
        let components = new_state.components();
        // The explicit slice lands first so that implicit increments see
        // entries already split along the transition bounds.
        for component in components.iter().filter(|c| !c.implicit) {
            self.ranges.add_range(component.clone())?;
        }
        for component in components.iter().filter(|c| c.implicit) {
            self.ranges.increment_blocks(component);
        }
        Ok(())
    }

    /// True iff some held range equals `object` on the five core fields.
    pub fn has_state_object(&self, object: &StateObject) -> bool {
        self.ranges
            .get_overlapping(&object.start, &object.end)
            .iter()
            .any(|e| e == object)
    }

    /// Held ranges overlapping the explicit range of `object`.
    pub fn get_old_states(&self, object: &StateObject) -> Vec<StateObject> {
        self.ranges.get_overlapping(&object.start, &object.end)
    }

    /// Merge another manager into this one.
    ///
    /// Every range of `other` is applied through the overlap-resolving
    /// insert. Errors on individual entries are logged and swallowed so
    /// the merge is total.
    pub fn merge(&mut self, other: &SnapshotManager) {
        for range in other.state() {
            if let Err(e) = self.ranges.add_range(range) {
                debug!(error = %e, "Skipping unmergeable range");
            }
        }
    }

    /// Serialize the full range set for head-state persistence.
    pub fn encode(&self) -> Vec<u8> {
        let entries = self.ranges.entries();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(entries.len() as u32).to_be_bytes());
        for entry in entries {
            let encoded = entry.encode();
            bytes.extend_from_slice(&(encoded.len() as u32).to_be_bytes());
            bytes.extend_from_slice(&encoded);
        }
        bytes
    }

    /// Deserialize a persisted range set.
    pub fn decode(bytes: &[u8]) -> StateResult<Self> {
        if bytes.len() < 4 {
            return Err(StateError::Serialization(
                "Head state too short".to_string(),
            ));
        }
        let count = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let mut offset = 4;
        let mut ranges = Vec::with_capacity(count);
        for _ in 0..count {
            if offset + 4 > bytes.len() {
                return Err(StateError::Serialization(
                    "Head state truncated".to_string(),
                ));
            }
            let len = u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
            offset += 4;
            if offset + len > bytes.len() {
                return Err(StateError::Serialization(
                    "Head state truncated".to_string(),
                ));
            }
            ranges.push(StateObject::decode(&bytes[offset..offset + len])?);
            offset += len;
        }
        Ok(Self::from_ranges(ranges))
    }
}

impl PartialEq for SnapshotManager {
    fn eq(&self, other: &Self) -> bool {
        self.ranges.entries() == other.ranges.entries()
    }
}

impl Eq for SnapshotManager {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Address;
    use num_bigint::BigUint;

    fn owned(owner: u8, start: u64, end: u64, block: u64) -> StateObject {
        StateObject::new(start, end, block, Address::new([owner; 20]), vec![owner])
    }

    #[test]
    fn test_apply_deposit_then_query() {
        let mut manager = SnapshotManager::new();
        manager.apply_deposit(owned(1, 0, 100, 1)).unwrap();

        assert_eq!(manager.len(), 1);
        assert!(manager.has_state_object(&owned(1, 0, 100, 1)));
        assert!(!manager.has_state_object(&owned(2, 0, 100, 1)));
    }

    #[test]
    fn test_transition_with_implicit_components() {
        let mut manager = SnapshotManager::new();
        manager.apply_deposit(owned(1, 0, 100, 4)).unwrap();

        // Transition over [30, 70) at block 5 proven against implicit
        // bounds [0, 100): the explicit slice is overwritten, the implicit
        // slices advance from block 4 to 5.
        let mut new_state = owned(2, 30, 70, 5);
        new_state.implicit_start = Some(BigUint::from(0u8));
        new_state.implicit_end = Some(BigUint::from(100u8));
        manager.apply_transition(&new_state).unwrap();

        let state = manager.state();
        assert_eq!(state.len(), 3);
        assert_eq!(state[0], owned(1, 0, 30, 5));
        assert_eq!(state[1], owned(2, 30, 70, 5));
        assert_eq!(state[2], owned(1, 70, 100, 5));
    }

    #[test]
    fn test_implicit_component_skips_stale_blocks() {
        let mut manager = SnapshotManager::new();
        manager.apply_deposit(owned(1, 0, 30, 2)).unwrap();

        let mut new_state = owned(2, 30, 70, 5);
        new_state.implicit_start = Some(BigUint::from(0u8));
        new_state.implicit_end = Some(BigUint::from(70u8));
        manager.apply_transition(&new_state).unwrap();

        // The implicit slice holds block 2, not block 4, so it stays put.
        assert!(manager.has_state_object(&owned(1, 0, 30, 2)));
        assert!(manager.has_state_object(&owned(2, 30, 70, 5)));
    }

    #[test]
    fn test_get_old_states_uses_explicit_bounds() {
        let mut manager = SnapshotManager::new();
        manager.apply_deposit(owned(1, 0, 30, 1)).unwrap();
        manager.apply_deposit(owned(2, 30, 60, 1)).unwrap();

        let mut query = owned(3, 30, 50, 2);
        query.implicit_start = Some(BigUint::from(0u8));
        let old = manager.get_old_states(&query);
        assert_eq!(old.len(), 1);
        assert_eq!(old[0].state[0], 2);
    }

    #[test]
    fn test_merge_is_total() {
        let mut head = SnapshotManager::new();
        head.apply_deposit(owned(1, 0, 100, 3)).unwrap();

        let mut post = SnapshotManager::new();
        post.apply_deposit(owned(2, 20, 80, 5)).unwrap();
        post.apply_deposit(owned(3, 200, 300, 1)).unwrap();

        head.merge(&post);
        let state = head.state();
        assert_eq!(state.len(), 4);
        assert_eq!(state[1], owned(2, 20, 80, 5));
        assert_eq!(state[3], owned(3, 200, 300, 1));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut head = SnapshotManager::new();
        head.apply_deposit(owned(1, 0, 100, 1)).unwrap();

        let mut post = SnapshotManager::new();
        post.apply_deposit(owned(2, 20, 80, 2)).unwrap();

        head.merge(&post);
        let once = head.clone();
        head.merge(&post);
        assert_eq!(head, once);
    }

    #[test]
    fn test_equality_over_sorted_contents() {
        let mut a = SnapshotManager::new();
        a.apply_deposit(owned(1, 50, 100, 1)).unwrap();
        a.apply_deposit(owned(2, 0, 50, 1)).unwrap();

        let mut b = SnapshotManager::new();
        b.apply_deposit(owned(2, 0, 50, 1)).unwrap();
        b.apply_deposit(owned(1, 50, 100, 1)).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let mut manager = SnapshotManager::new();
        manager.apply_deposit(owned(1, 0, 100, 1)).unwrap();
        manager.apply_deposit(owned(2, 150, 400, 7)).unwrap();

        let decoded = SnapshotManager::decode(&manager.encode()).unwrap();
        assert_eq!(decoded, manager);
    }

    #[test]
    fn test_decode_empty_state() {
        let manager = SnapshotManager::new();
        let decoded = SnapshotManager::decode(&manager.encode()).unwrap();
        assert!(decoded.is_empty());
    }
}
