//! Merkle sum-tree inclusion proofs.
//!
//! Block commitments are roots of a binary Merkle sum tree: every node
//! carries a hash and a sum, a parent hashes `left.hash | left.sum |
//! right.hash | right.sum` and carries the two sums added. Besides
//! membership, a branch therefore proves which contiguous slice of the
//! coin space the leaf is responsible for - its implicit bounds.

use crate::{keccak256, ProofError, ProofResult};
use num_bigint::BigUint;
use num_traits::Zero;

/// Fixed width of a node sum on the wire, in bytes.
pub const SUM_BYTES: usize = 16;

/// A sibling node in a sum-tree branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SumTreeNode {
    /// Node hash.
    pub hash: [u8; 32],
    /// Node sum (total coin-space width under the node).
    pub sum: BigUint,
}

impl SumTreeNode {
    /// Create a node.
    pub fn new(hash: [u8; 32], sum: impl Into<BigUint>) -> Self {
        Self {
            hash,
            sum: sum.into(),
        }
    }
}

/// An inclusion proof for one leaf of a sum tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionProof {
    /// Index of the proven leaf.
    pub leaf_index: u64,
    /// Sum carried by the proven leaf.
    pub leaf_sum: BigUint,
    /// Sibling nodes from the leaf level up to just below the root.
    pub branch: Vec<SumTreeNode>,
}

impl InclusionProof {
    /// An empty proof (single-leaf tree).
    pub fn empty(leaf_sum: impl Into<BigUint>) -> Self {
        Self {
            leaf_index: 0,
            leaf_sum: leaf_sum.into(),
            branch: Vec::new(),
        }
    }

    /// Derive the implicit bounds the proof assigns to the leaf.
    ///
    /// The implicit start is the total sum of every subtree left of the
    /// path; the implicit end adds the leaf's own sum.
    pub fn implicit_bounds(&self) -> (BigUint, BigUint) {
        let mut left_total = BigUint::zero();
        for (level, sibling) in self.branch.iter().enumerate() {
            if (self.leaf_index >> level) & 1 == 1 {
                left_total += &sibling.sum;
            }
        }
        let implicit_end = &left_total + &self.leaf_sum;
        (left_total, implicit_end)
    }

    /// Verify that `leaf_data` is included under `root`.
    ///
    /// The leaf hashes as `keccak256(leaf_data)`; sums wider than
    /// [`SUM_BYTES`] make the proof unverifiable and fail cleanly.
    pub fn verify(&self, leaf_data: &[u8], root: &[u8; 32]) -> bool {
        let mut hash = keccak256(leaf_data);
        let mut sum = self.leaf_sum.clone();

        for (level, sibling) in self.branch.iter().enumerate() {
            let (own, sib) = match (sum_to_bytes(&sum), sum_to_bytes(&sibling.sum)) {
                (Some(own), Some(sib)) => (own, sib),
                _ => return false,
            };
            let mut parent = Vec::with_capacity(2 * (32 + SUM_BYTES));
            if (self.leaf_index >> level) & 1 == 0 {
                parent.extend_from_slice(&hash);
                parent.extend_from_slice(&own);
                parent.extend_from_slice(&sibling.hash);
                parent.extend_from_slice(&sib);
            } else {
                parent.extend_from_slice(&sibling.hash);
                parent.extend_from_slice(&sib);
                parent.extend_from_slice(&hash);
                parent.extend_from_slice(&own);
            }
            hash = keccak256(&parent);
            sum += &sibling.sum;
        }

        hash == *root
    }
}

/// A fully materialised Merkle sum tree.
///
/// Built leaf-up from `(data, sum)` pairs; used by the operator side of
/// tests and tooling to produce commitments and proofs that
/// [`InclusionProof::verify`] accepts.
#[derive(Debug, Clone)]
pub struct MerkleSumTree {
    levels: Vec<Vec<SumTreeNode>>,
}

impl MerkleSumTree {
    /// Build a tree from leaves. Fails on an empty leaf set or a sum
    /// wider than [`SUM_BYTES`].
    pub fn new(leaves: Vec<(Vec<u8>, BigUint)>) -> ProofResult<Self> {
        if leaves.is_empty() {
            return Err(ProofError::Encoding(
                "Sum tree needs at least one leaf".to_string(),
            ));
        }
        let mut level: Vec<SumTreeNode> = leaves
            .into_iter()
            .map(|(data, sum)| {
                if sum_to_bytes(&sum).is_none() {
                    return Err(ProofError::Encoding(format!(
                        "Leaf sum {} exceeds {} bytes",
                        sum, SUM_BYTES
                    )));
                }
                Ok(SumTreeNode::new(keccak256(&data), sum))
            })
            .collect::<ProofResult<_>>()?;

        // Pad to a power of two with empty leaves.
        let width = level.len().next_power_of_two();
        while level.len() < width {
            level.push(SumTreeNode::new(keccak256(&[]), BigUint::zero()));
        }

        let mut levels = vec![level];
        while levels.last().unwrap().len() > 1 {
            let below = levels.last().unwrap();
            let mut above = Vec::with_capacity(below.len() / 2);
            for pair in below.chunks(2) {
                above.push(parent_node(&pair[0], &pair[1])?);
            }
            levels.push(above);
        }

        Ok(Self { levels })
    }

    /// The committed root hash.
    pub fn root(&self) -> [u8; 32] {
        self.levels.last().unwrap()[0].hash
    }

    /// Total sum under the root.
    pub fn total_sum(&self) -> BigUint {
        self.levels.last().unwrap()[0].sum.clone()
    }

    /// Produce the inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> ProofResult<InclusionProof> {
        let leaf_level = &self.levels[0];
        if index >= leaf_level.len() {
            return Err(ProofError::Encoding(format!(
                "Leaf index {} out of range ({} leaves)",
                index,
                leaf_level.len()
            )));
        }

        let mut branch = Vec::with_capacity(self.levels.len() - 1);
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            branch.push(level[position ^ 1].clone());
            position >>= 1;
        }

        Ok(InclusionProof {
            leaf_index: index as u64,
            leaf_sum: leaf_level[index].sum.clone(),
            branch,
        })
    }
}

fn parent_node(left: &SumTreeNode, right: &SumTreeNode) -> ProofResult<SumTreeNode> {
    let left_sum = sum_to_bytes(&left.sum)
        .ok_or_else(|| ProofError::Encoding("Node sum overflow".to_string()))?;
    let right_sum = sum_to_bytes(&right.sum)
        .ok_or_else(|| ProofError::Encoding("Node sum overflow".to_string()))?;
    let mut data = Vec::with_capacity(2 * (32 + SUM_BYTES));
    data.extend_from_slice(&left.hash);
    data.extend_from_slice(&left_sum);
    data.extend_from_slice(&right.hash);
    data.extend_from_slice(&right_sum);
    Ok(SumTreeNode::new(
        keccak256(&data),
        &left.sum + &right.sum,
    ))
}

/// Fixed-width big-endian sum encoding; `None` when the value does not fit.
fn sum_to_bytes(sum: &BigUint) -> Option<[u8; SUM_BYTES]> {
    let raw = sum.to_bytes_be();
    if raw.len() > SUM_BYTES {
        return None;
    }
    let mut out = [0u8; SUM_BYTES];
    out[SUM_BYTES - raw.len()..].copy_from_slice(&raw);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(sums: &[u64]) -> Vec<(Vec<u8>, BigUint)> {
        sums.iter()
            .enumerate()
            .map(|(i, s)| (vec![i as u8; 4], BigUint::from(*s)))
            .collect()
    }

    #[test]
    fn test_single_leaf_tree() {
        let tree = MerkleSumTree::new(leaves(&[100])).unwrap();
        let proof = tree.proof(0).unwrap();
        assert!(proof.verify(&[0, 0, 0, 0], &tree.root()));

        let (start, end) = proof.implicit_bounds();
        assert_eq!(start, BigUint::from(0u8));
        assert_eq!(end, BigUint::from(100u8));
    }

    #[test]
    fn test_all_leaves_verify() {
        let tree = MerkleSumTree::new(leaves(&[10, 20, 30, 40])).unwrap();
        for i in 0..4usize {
            let proof = tree.proof(i).unwrap();
            assert!(
                proof.verify(&[i as u8; 4], &tree.root()),
                "leaf {} failed",
                i
            );
        }
        assert_eq!(tree.total_sum(), BigUint::from(100u8));
    }

    #[test]
    fn test_implicit_bounds_accumulate_left_sums() {
        let tree = MerkleSumTree::new(leaves(&[10, 20, 30, 40])).unwrap();

        let expectations = [(0u64, 10u64), (10, 30), (30, 60), (60, 100)];
        for (i, (start, end)) in expectations.iter().enumerate() {
            let (actual_start, actual_end) = tree.proof(i).unwrap().implicit_bounds();
            assert_eq!(actual_start, BigUint::from(*start), "leaf {}", i);
            assert_eq!(actual_end, BigUint::from(*end), "leaf {}", i);
        }
    }

    #[test]
    fn test_padded_tree_verifies() {
        // Three leaves pad to four; the padding leaf carries sum zero.
        let tree = MerkleSumTree::new(leaves(&[5, 6, 7])).unwrap();
        for i in 0..3usize {
            assert!(tree.proof(i).unwrap().verify(&[i as u8; 4], &tree.root()));
        }
        assert_eq!(tree.total_sum(), BigUint::from(18u8));
    }

    #[test]
    fn test_wrong_leaf_data_fails() {
        let tree = MerkleSumTree::new(leaves(&[10, 20])).unwrap();
        let proof = tree.proof(0).unwrap();
        assert!(!proof.verify(b"not the leaf", &tree.root()));
    }

    #[test]
    fn test_wrong_root_fails() {
        let tree = MerkleSumTree::new(leaves(&[10, 20])).unwrap();
        let proof = tree.proof(1).unwrap();
        assert!(!proof.verify(&[1u8; 4], &[0u8; 32]));
    }

    #[test]
    fn test_tampered_sum_fails() {
        let tree = MerkleSumTree::new(leaves(&[10, 20, 30, 40])).unwrap();
        let mut proof = tree.proof(2).unwrap();
        proof.branch[0].sum += 1u8;
        assert!(!proof.verify(&[2u8; 4], &tree.root()));
    }

    #[test]
    fn test_oversized_sum_rejected() {
        let huge = BigUint::from(1u8) << 130;
        let result = MerkleSumTree::new(vec![(vec![1], huge)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_tree_rejected() {
        assert!(MerkleSumTree::new(Vec::new()).is_err());
    }
}
