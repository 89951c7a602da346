//! Plasma transactions and proof bundles.

use crate::sum_tree::{InclusionProof, SumTreeNode};
use crate::{keccak256, ProofError, ProofResult};
use num_bigint::BigUint;
use plasma_state::codec::{read_biguint, read_bytes, write_biguint, write_bytes};
use plasma_state::{Address, StateObject};

/// A transition committed to a plasma block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Plasma block the transition was included in.
    pub block: BigUint,
    /// Sum-tree branch proving inclusion under the block root.
    pub inclusion_proof: InclusionProof,
    /// Predicate witness (for the ownership predicate, the 20-byte sender
    /// address followed by signature material).
    pub witness: Vec<u8>,
    /// Post-state of the transition.
    pub new_state: StateObject,
}

impl Transaction {
    /// Create a transaction.
    pub fn new(
        block: impl Into<BigUint>,
        inclusion_proof: InclusionProof,
        witness: Vec<u8>,
        new_state: StateObject,
    ) -> Self {
        Self {
            block: block.into(),
            inclusion_proof,
            witness,
            new_state,
        }
    }

    /// Transaction hash: keccak256 over the encoded form.
    pub fn hash(&self) -> [u8; 32] {
        keccak256(&self.encode())
    }

    /// The sender the witness names, or the null address when the witness
    /// is too short to carry one.
    pub fn sender(&self) -> Address {
        if self.witness.len() >= 20 {
            Address::from_slice(&self.witness[..20]).unwrap_or_else(|_| Address::zero())
        } else {
            Address::zero()
        }
    }

    /// Serialize the transaction.
    ///
    /// Format: block | leaf_index (8) | leaf_sum | branch_count (2) |
    /// branch nodes (hash 32 | sum) | witness | new_state, with integers
    /// and byte strings length-prefixed.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        write_biguint(&mut bytes, &self.block);
        bytes.extend_from_slice(&self.inclusion_proof.leaf_index.to_be_bytes());
        write_biguint(&mut bytes, &self.inclusion_proof.leaf_sum);
        bytes.extend_from_slice(&(self.inclusion_proof.branch.len() as u16).to_be_bytes());
        for node in &self.inclusion_proof.branch {
            bytes.extend_from_slice(&node.hash);
            write_biguint(&mut bytes, &node.sum);
        }
        write_bytes(&mut bytes, &self.witness);
        write_bytes(&mut bytes, &self.new_state.encode());
        bytes
    }

    /// Deserialize a transaction.
    pub fn decode(bytes: &[u8]) -> ProofResult<Self> {
        let mut offset = 0;
        let block = read_biguint(bytes, &mut offset)?;

        if offset + 8 > bytes.len() {
            return Err(ProofError::Encoding(
                "Transaction truncated at leaf index".to_string(),
            ));
        }
        let leaf_index = u64::from_be_bytes(bytes[offset..offset + 8].try_into().unwrap());
        offset += 8;
        let leaf_sum = read_biguint(bytes, &mut offset)?;

        if offset + 2 > bytes.len() {
            return Err(ProofError::Encoding(
                "Transaction truncated at branch count".to_string(),
            ));
        }
        let branch_count =
            u16::from_be_bytes(bytes[offset..offset + 2].try_into().unwrap()) as usize;
        offset += 2;

        let mut branch = Vec::with_capacity(branch_count);
        for _ in 0..branch_count {
            if offset + 32 > bytes.len() {
                return Err(ProofError::Encoding(
                    "Transaction truncated at branch node".to_string(),
                ));
            }
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&bytes[offset..offset + 32]);
            offset += 32;
            let sum = read_biguint(bytes, &mut offset)?;
            branch.push(SumTreeNode { hash, sum });
        }

        let witness = read_bytes(bytes, &mut offset)?;
        let state_bytes = read_bytes(bytes, &mut offset)?;
        let new_state = StateObject::decode(&state_bytes)?;

        if offset != bytes.len() {
            return Err(ProofError::Encoding(format!(
                "Trailing bytes after transaction: {} of {}",
                offset,
                bytes.len()
            )));
        }

        Ok(Self {
            block,
            inclusion_proof: InclusionProof {
                leaf_index,
                leaf_sum,
                branch,
            },
            witness,
            new_state,
        })
    }
}

/// The history bundle backing one target transaction.
///
/// Deposits are ordered by `start`, transactions by `block`; the
/// constructor enforces both so verification can walk the bundle in
/// order.
#[derive(Debug, Clone, Default)]
pub struct TransactionProof {
    /// Anchor-chain deposits the history starts from.
    pub deposits: Vec<StateObject>,
    /// Proven transitions in ascending block order.
    pub transactions: Vec<Transaction>,
}

impl TransactionProof {
    /// Create a proof bundle, sorting deposits and transactions into
    /// their canonical order.
    pub fn new(mut deposits: Vec<StateObject>, mut transactions: Vec<Transaction>) -> Self {
        deposits.sort_by(|a, b| a.start.cmp(&b.start));
        transactions.sort_by(|a, b| a.block.cmp(&b.block));
        Self {
            deposits,
            transactions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MerkleSumTree;

    fn sample_state() -> StateObject {
        StateObject::new(
            30u32,
            70u32,
            5u32,
            Address::new([0x11; 20]),
            vec![0xaa; 28],
        )
    }

    fn sample_transaction() -> Transaction {
        let state = sample_state();
        let tree = MerkleSumTree::new(vec![
            (state.encode(), BigUint::from(100u8)),
            (vec![9, 9, 9], BigUint::from(50u8)),
        ])
        .unwrap();
        let mut witness = vec![0x22; 20];
        witness.extend_from_slice(&[0xcc; 65]);
        Transaction::new(5u32, tree.proof(0).unwrap(), witness, state)
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let tx = sample_transaction();
        let decoded = Transaction::decode(&tx.encode()).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.encode(), tx.encode());
    }

    #[test]
    fn test_hash_is_stable_and_content_sensitive() {
        let tx = sample_transaction();
        assert_eq!(tx.hash(), tx.hash());

        let mut other = tx.clone();
        other.witness[20] ^= 1;
        assert_ne!(tx.hash(), other.hash());
    }

    #[test]
    fn test_sender_from_witness() {
        let tx = sample_transaction();
        assert_eq!(tx.sender(), Address::new([0x22; 20]));

        let mut short = tx;
        short.witness = vec![1, 2, 3];
        assert_eq!(short.sender(), Address::zero());
    }

    #[test]
    fn test_decode_rejects_truncation() {
        let encoded = sample_transaction().encode();
        assert!(Transaction::decode(&encoded[..encoded.len() / 2]).is_err());
        assert!(Transaction::decode(&[]).is_err());
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut encoded = sample_transaction().encode();
        encoded.push(7);
        assert!(Transaction::decode(&encoded).is_err());
    }

    #[test]
    fn test_proof_bundle_sorts_contents() {
        let mut late = sample_transaction();
        late.block = BigUint::from(9u8);
        let early = sample_transaction();

        let d1 = StateObject::new(50u32, 60u32, 0u32, Address::zero(), vec![]);
        let d2 = StateObject::new(0u32, 10u32, 0u32, Address::zero(), vec![]);

        let proof = TransactionProof::new(vec![d1, d2], vec![late, early]);
        assert_eq!(proof.deposits[0].start, BigUint::from(0u8));
        assert_eq!(proof.transactions[0].block, BigUint::from(5u8));
        assert_eq!(proof.transactions[1].block, BigUint::from(9u8));
    }
}
