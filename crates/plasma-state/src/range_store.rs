//! Sorted, non-overlapping container over the integer coin space.

use crate::{StateError, StateResult};
use num_bigint::BigUint;
use num_traits::Zero;

/// An entry that occupies a half-open `[start, end)` range at a block.
///
/// Implementors are value types; the store rewrites bounds and blocks by
/// producing fresh copies so that splits keep every other field intact.
pub trait RangeItem: Clone {
    /// Inclusive lower bound.
    fn range_start(&self) -> &BigUint;
    /// Exclusive upper bound.
    fn range_end(&self) -> &BigUint;
    /// Block number used for conflict resolution.
    fn range_block(&self) -> &BigUint;
    /// Copy of this item with new bounds.
    fn with_bounds(&self, start: BigUint, end: BigUint) -> Self;
    /// Copy of this item with a new block.
    fn with_block(&self, block: BigUint) -> Self;
}

/// A sorted collection of non-overlapping ranged entries.
///
/// Overlap conflicts are resolved by block number: an incoming range
/// overwrites the overlapped slices of any entry with a strictly lower
/// block, and is itself trimmed where an entry with an equal or higher
/// block already covers the coins. Iteration order is deterministic by
/// `(start, end)`.
#[derive(Debug, Clone)]
pub struct RangeStore<T: RangeItem> {
    entries: Vec<T>,
}

impl<T: RangeItem> Default for RangeStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: RangeItem> RangeStore<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Borrow the sorted entries.
    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    /// Insert a range, resolving overlaps by block number.
    ///
    /// Slices of `range` covered by an existing entry with an equal or
    /// higher block are dropped; slices of existing entries with a lower
    /// block are removed before the survivors of `range` are inserted.
    /// Rejects `start >= end` with [`StateError::InvalidRange`].
    pub fn add_range(&mut self, range: T) -> StateResult<()> {
        if range.range_start() >= range.range_end() {
            return Err(StateError::InvalidRange {
                start: range.range_start().to_string(),
                end: range.range_end().to_string(),
            });
        }

        // Surviving slices of the incoming range, and overlapped slices of
        // lower-block entries that must be vacated first.
        let mut survivors = vec![(range.range_start().clone(), range.range_end().clone())];
        let mut vacate: Vec<(BigUint, BigUint)> = Vec::new();

        for entry in self
            .entries
            .iter()
            .filter(|e| overlaps(*e, range.range_start(), range.range_end()))
        {
            let overlap_start = range.range_start().max(entry.range_start()).clone();
            let overlap_end = range.range_end().min(entry.range_end()).clone();
            if entry.range_block() >= range.range_block() {
                survivors = subtract(survivors, &overlap_start, &overlap_end);
            } else {
                vacate.push((overlap_start, overlap_end));
            }
        }

        for (start, end) in vacate {
            self.remove_range(&start, &end);
        }
        for (start, end) in survivors {
            self.entries.push(range.with_bounds(start, end));
        }
        self.sort();
        Ok(())
    }

    /// Remove `[start, end)`, splitting partially covered entries.
    ///
    /// Every overlapping entry is deleted and its non-empty left and right
    /// remainders are re-inserted. Total: an empty or non-overlapping
    /// range is a no-op.
    pub fn remove_range(&mut self, start: &BigUint, end: &BigUint) {
        let mut kept = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            let overlap_start = start.max(entry.range_start()).clone();
            let overlap_end = end.min(entry.range_end()).clone();
            if overlap_start >= overlap_end {
                kept.push(entry);
                continue;
            }
            if entry.range_start() < &overlap_start {
                kept.push(entry.with_bounds(entry.range_start().clone(), overlap_start));
            }
            if &overlap_end < entry.range_end() {
                kept.push(entry.with_bounds(overlap_end, entry.range_end().clone()));
            }
        }
        self.entries = kept;
        self.sort();
    }

    /// Entries whose range intersects `[start, end)`, as defensive copies.
    pub fn get_overlapping(&self, start: &BigUint, end: &BigUint) -> Vec<T> {
        self.entries
            .iter()
            .filter(|e| overlaps(*e, start, end))
            .cloned()
            .collect()
    }

    /// Advance the block of entries fully contained in `range` that sit
    /// exactly one block behind it.
    pub fn increment_blocks(&mut self, range: &T) {
        if range.range_block().is_zero() {
            return;
        }
        let previous = range.range_block() - 1u32;
        for entry in self.entries.iter_mut() {
            if entry.range_start() >= range.range_start()
                && entry.range_end() <= range.range_end()
                && entry.range_block() == &previous
            {
                *entry = entry.with_block(range.range_block().clone());
            }
        }
    }

    /// Push an entry without overlap resolution.
    ///
    /// Only for restoring a set already known to be disjoint (persisted
    /// head state); callers go through [`RangeStore::add_range`] otherwise.
    pub(crate) fn push_unchecked(&mut self, entry: T) {
        self.entries.push(entry);
        self.sort();
    }

    fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            a.range_start()
                .cmp(b.range_start())
                .then_with(|| a.range_end().cmp(b.range_end()))
        });
    }
}

fn overlaps<T: RangeItem>(entry: &T, start: &BigUint, end: &BigUint) -> bool {
    entry.range_start() < end && entry.range_end() > start
}

/// Subtract `[cut_start, cut_end)` from each disjoint slice.
fn subtract(
    slices: Vec<(BigUint, BigUint)>,
    cut_start: &BigUint,
    cut_end: &BigUint,
) -> Vec<(BigUint, BigUint)> {
    let mut result = Vec::with_capacity(slices.len() + 1);
    for (start, end) in slices {
        if &end <= cut_start || &start >= cut_end {
            result.push((start, end));
            continue;
        }
        if &start < cut_start {
            result.push((start, cut_start.clone()));
        }
        if cut_end < &end {
            result.push((cut_end.clone(), end));
        }
    }
    result
}
