//! Transaction history proof verification.

use crate::{ChainResult, ChainStore};
use parking_lot::RwLock;
use plasma_providers::{AnchorClient, ProviderError};
use plasma_proof::{PredicateEvaluator, ProofError, Transaction, TransactionProof};
use plasma_state::{Address, SnapshotManager};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Verifies that a target transaction is backed by a valid history.
///
/// Given a target transaction and its proof bundle (prior deposits plus
/// inclusion-proven transitions), the verifier checks every deposit
/// against the anchor contract, every transition against its block
/// commitment and predicate, and replays the bundle into a fresh
/// post-state. The head state is never touched here; the caller merges
/// the returned post-state under the `state` lock once verification
/// succeeds.
pub struct ProofVerifier {
    chain_store: Arc<ChainStore>,
    anchor: Arc<dyn AnchorClient>,
    evaluator: Arc<dyn PredicateEvaluator>,
    /// Write-through bytecode cache; never evicted within a proof
    /// application.
    bytecode_cache: RwLock<HashMap<Address, Vec<u8>>>,
}

impl ProofVerifier {
    /// Create a verifier.
    pub fn new(
        chain_store: Arc<ChainStore>,
        anchor: Arc<dyn AnchorClient>,
        evaluator: Arc<dyn PredicateEvaluator>,
    ) -> Self {
        Self {
            chain_store,
            anchor,
            evaluator,
            bytecode_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Verify `proof` and produce the post-state containing
    /// `transaction.new_state`.
    ///
    /// Failures are precise: the first offending deposit, inclusion proof
    /// or transition aborts the application with the matching
    /// [`ProofError`] variant and no state is produced.
    #[instrument(skip_all, fields(block = %transaction.block))]
    pub async fn apply_proof(
        &self,
        transaction: &Transaction,
        proof: &TransactionProof,
    ) -> ChainResult<SnapshotManager> {
        // Deposits must be recognised by the anchor contract.
        for deposit in &proof.deposits {
            if !self.anchor.deposit_valid(deposit).await? {
                return Err(ProofError::InvalidDeposit(format!(
                    "[{}, {}) at block {}",
                    deposit.start, deposit.end, deposit.block
                ))
                .into());
            }
        }

        // Each transition must be included under its block commitment;
        // inclusion also pins down the implicit bounds.
        let mut transitions = proof.transactions.clone();
        transitions.sort_by(|a, b| a.block.cmp(&b.block));
        for transition in &mut transitions {
            let root = self
                .chain_store
                .get_block_header(&transition.block)?
                .ok_or_else(|| ProofError::MissingBlockRoot(transition.block.to_string()))?;

            let (implicit_start, implicit_end) = transition.inclusion_proof.implicit_bounds();
            transition.new_state.implicit_start = Some(implicit_start);
            transition.new_state.implicit_end = Some(implicit_end);
            transition
                .new_state
                .validate()
                .map_err(|e| ProofError::InvalidInclusion(e.to_string()))?;

            if !transition
                .inclusion_proof
                .verify(&transition.new_state.encode(), &root)
            {
                return Err(ProofError::InvalidInclusion(format!(
                    "leaf {} of block {}",
                    transition.inclusion_proof.leaf_index, transition.block
                ))
                .into());
            }
        }

        // Replay the bundle into a fresh post-state.
        let mut post_state = SnapshotManager::new();
        let mut deposits = proof.deposits.clone();
        deposits.sort_by(|a, b| a.start.cmp(&b.start));
        for deposit in deposits {
            post_state.apply_deposit(deposit)?;
        }

        for transition in &transitions {
            let new_state_encoded = transition.new_state.encode();
            for old_state in post_state.get_old_states(&transition.new_state) {
                let bytecode = self.predicate_bytecode(old_state.predicate).await?;
                let valid = self.evaluator.valid_state_transition(
                    &old_state.encode(),
                    &new_state_encoded,
                    &transition.witness,
                    &bytecode,
                )?;
                if !valid {
                    return Err(ProofError::InvalidTransition(format!(
                        "[{}, {}) from block {} to block {}",
                        old_state.start, old_state.end, old_state.block, transition.block
                    ))
                    .into());
                }
            }
            post_state.apply_transition(&transition.new_state)?;
        }

        // The bundle must actually produce the target state.
        if !post_state.has_state_object(&transaction.new_state) {
            return Err(ProofError::InvalidTransition(
                "history does not produce the target state".to_string(),
            )
            .into());
        }

        debug!(ranges = post_state.len(), "Proof verified");
        Ok(post_state)
    }

    /// Fetch predicate bytecode through the write-through cache.
    ///
    /// Lookup order: in-memory cache, chain store, anchor chain. Anchor
    /// hits are persisted before being returned; a miss everywhere is
    /// [`ProofError::UnknownPredicate`].
    async fn predicate_bytecode(&self, predicate: Address) -> ChainResult<Vec<u8>> {
        if let Some(code) = self.bytecode_cache.read().get(&predicate) {
            return Ok(code.clone());
        }
        if let Some(code) = self.chain_store.get_predicate_bytecode(predicate)? {
            self.bytecode_cache.write().insert(predicate, code.clone());
            return Ok(code);
        }
        match self.anchor.contract_bytecode(predicate).await {
            Ok(code) => {
                self.chain_store.set_predicate_bytecode(predicate, &code)?;
                self.bytecode_cache.write().insert(predicate, code.clone());
                Ok(code)
            }
            Err(ProviderError::NotFound(_)) => {
                Err(ProofError::UnknownPredicate(predicate).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChainError;
    use num_bigint::BigUint;
    use plasma_proof::{MerkleSumTree, OwnershipEvaluator, OwnershipState};
    use plasma_providers::MockAnchorClient;
    use plasma_state::StateObject;
    use plasma_storage::MemoryStorage;

    const PREDICATE: [u8; 20] = [0xee; 20];

    fn alice() -> Address {
        Address::new([0xa1; 20])
    }

    fn bob() -> Address {
        Address::new([0xb2; 20])
    }

    fn ownership_object(owner: Address, start: u64, end: u64, block: u64) -> StateObject {
        StateObject::new(
            start,
            end,
            block,
            Address::new(PREDICATE),
            OwnershipState::new(owner, 0u32).encode().unwrap(),
        )
    }

    fn witness_of(sender: Address) -> Vec<u8> {
        let mut witness = sender.as_bytes().to_vec();
        witness.extend_from_slice(&[0u8; 65]);
        witness
    }

    struct Fixture {
        store: Arc<ChainStore>,
        anchor: Arc<MockAnchorClient>,
        verifier: ProofVerifier,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(ChainStore::new(Arc::new(MemoryStorage::new())));
        let anchor = Arc::new(MockAnchorClient::new());
        anchor.set_bytecode(Address::new(PREDICATE), vec![0x60, 0x0a]);
        let verifier = ProofVerifier::new(
            Arc::clone(&store),
            Arc::clone(&anchor) as Arc<dyn AnchorClient>,
            Arc::new(OwnershipEvaluator::new()),
        );
        Fixture {
            store,
            anchor,
            verifier,
        }
    }

    /// One deposit for alice at block 0, one transfer to bob at block 1,
    /// committed to a single-leaf tree whose root is stored.
    fn transfer_bundle(fx: &Fixture) -> (Transaction, TransactionProof) {
        let deposit = ownership_object(alice(), 0, 100, 0);
        let new_state = ownership_object(bob(), 0, 100, 1);

        let tree =
            MerkleSumTree::new(vec![(new_state.encode(), BigUint::from(100u8))]).unwrap();
        fx.store
            .set_block_header(&BigUint::from(1u8), tree.root())
            .unwrap();

        let transaction = Transaction::new(
            1u32,
            tree.proof(0).unwrap(),
            witness_of(alice()),
            new_state,
        );
        let proof = TransactionProof::new(vec![deposit], vec![transaction.clone()]);
        (transaction, proof)
    }

    #[tokio::test]
    async fn test_valid_transfer_produces_post_state() {
        let fx = fixture();
        let (transaction, proof) = transfer_bundle(&fx);

        let post_state = fx.verifier.apply_proof(&transaction, &proof).await.unwrap();
        assert!(post_state.has_state_object(&transaction.new_state));
        assert_eq!(post_state.len(), 1);
    }

    #[tokio::test]
    async fn test_apply_proof_is_idempotent() {
        let fx = fixture();
        let (transaction, proof) = transfer_bundle(&fx);

        let first = fx.verifier.apply_proof(&transaction, &proof).await.unwrap();
        let second = fx.verifier.apply_proof(&transaction, &proof).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_invalid_deposit_fails() {
        let fx = fixture();
        let (transaction, proof) = transfer_bundle(&fx);
        fx.anchor
            .reject_deposit(BigUint::from(0u8), BigUint::from(100u8));

        let result = fx.verifier.apply_proof(&transaction, &proof).await;
        assert!(matches!(
            result,
            Err(ChainError::Proof(ProofError::InvalidDeposit(_)))
        ));
    }

    #[tokio::test]
    async fn test_missing_block_root_fails() {
        let fx = fixture();
        let (transaction, mut proof) = transfer_bundle(&fx);
        // Point the transition at a block with no stored commitment.
        proof.transactions[0].block = BigUint::from(9u8);

        let result = fx.verifier.apply_proof(&transaction, &proof).await;
        assert!(matches!(
            result,
            Err(ChainError::Proof(ProofError::MissingBlockRoot(_)))
        ));
    }

    #[tokio::test]
    async fn test_tampered_inclusion_fails() {
        let fx = fixture();
        let (transaction, mut proof) = transfer_bundle(&fx);
        proof.transactions[0].new_state.state =
            OwnershipState::new(alice(), 0u32).encode().unwrap();

        let result = fx.verifier.apply_proof(&transaction, &proof).await;
        assert!(matches!(
            result,
            Err(ChainError::Proof(ProofError::InvalidInclusion(_)))
        ));
    }

    #[tokio::test]
    async fn test_wrong_sender_is_invalid_transition() {
        let fx = fixture();
        let deposit = ownership_object(alice(), 0, 100, 0);
        let new_state = ownership_object(bob(), 0, 100, 1);

        let tree =
            MerkleSumTree::new(vec![(new_state.encode(), BigUint::from(100u8))]).unwrap();
        fx.store
            .set_block_header(&BigUint::from(1u8), tree.root())
            .unwrap();

        // Bob signs a spend of alice's range.
        let transaction =
            Transaction::new(1u32, tree.proof(0).unwrap(), witness_of(bob()), new_state);
        let proof = TransactionProof::new(vec![deposit], vec![transaction.clone()]);

        let result = fx.verifier.apply_proof(&transaction, &proof).await;
        assert!(matches!(
            result,
            Err(ChainError::Proof(ProofError::InvalidTransition(_)))
        ));
    }

    #[tokio::test]
    async fn test_unknown_predicate_fails() {
        let fx = fixture();
        let ghost = Address::new([0x99; 20]);

        let mut deposit = ownership_object(alice(), 0, 100, 0);
        deposit.predicate = ghost;
        let new_state = ownership_object(bob(), 0, 100, 1);

        let tree =
            MerkleSumTree::new(vec![(new_state.encode(), BigUint::from(100u8))]).unwrap();
        fx.store
            .set_block_header(&BigUint::from(1u8), tree.root())
            .unwrap();

        let transaction = Transaction::new(
            1u32,
            tree.proof(0).unwrap(),
            witness_of(alice()),
            new_state,
        );
        let proof = TransactionProof::new(vec![deposit], vec![transaction.clone()]);

        let result = fx.verifier.apply_proof(&transaction, &proof).await;
        assert!(matches!(
            result,
            Err(ChainError::Proof(ProofError::UnknownPredicate(_)))
        ));
    }

    #[tokio::test]
    async fn test_target_state_must_materialise() {
        let fx = fixture();
        let (mut transaction, proof) = transfer_bundle(&fx);
        // Ask for a different target than the history produces.
        transaction.new_state = ownership_object(alice(), 0, 100, 9);

        let result = fx.verifier.apply_proof(&transaction, &proof).await;
        assert!(matches!(
            result,
            Err(ChainError::Proof(ProofError::InvalidTransition(_)))
        ));
    }

    #[tokio::test]
    async fn test_bytecode_is_cached_write_through() {
        let fx = fixture();
        let (transaction, proof) = transfer_bundle(&fx);
        fx.verifier.apply_proof(&transaction, &proof).await.unwrap();

        // The anchor-fetched bytecode was persisted to the chain store.
        assert_eq!(
            fx.store
                .get_predicate_bytecode(Address::new(PREDICATE))
                .unwrap(),
            Some(vec![0x60, 0x0a])
        );

        // A fresh verifier over an anchor with no scripted bytecode must
        // find the code through the chain store.
        let bare_anchor = Arc::new(MockAnchorClient::new());
        let fresh_verifier = ProofVerifier::new(
            Arc::clone(&fx.store),
            Arc::clone(&bare_anchor) as Arc<dyn AnchorClient>,
            Arc::new(OwnershipEvaluator::new()),
        );
        assert!(fresh_verifier.apply_proof(&transaction, &proof).await.is_ok());
    }

    #[tokio::test]
    async fn test_multi_hop_history() {
        // alice -> bob (block 1), bob -> alice (block 2).
        let fx = fixture();
        let deposit = ownership_object(alice(), 0, 100, 0);

        let hop1_state = ownership_object(bob(), 0, 100, 1);
        let tree1 =
            MerkleSumTree::new(vec![(hop1_state.encode(), BigUint::from(100u8))]).unwrap();
        fx.store
            .set_block_header(&BigUint::from(1u8), tree1.root())
            .unwrap();
        let hop1 = Transaction::new(
            1u32,
            tree1.proof(0).unwrap(),
            witness_of(alice()),
            hop1_state,
        );

        let hop2_state = ownership_object(alice(), 0, 100, 2);
        let tree2 =
            MerkleSumTree::new(vec![(hop2_state.encode(), BigUint::from(100u8))]).unwrap();
        fx.store
            .set_block_header(&BigUint::from(2u8), tree2.root())
            .unwrap();
        let hop2 = Transaction::new(
            2u32,
            tree2.proof(0).unwrap(),
            witness_of(bob()),
            hop2_state,
        );

        let proof = TransactionProof::new(vec![deposit], vec![hop2.clone(), hop1]);
        let post_state = fx.verifier.apply_proof(&hop2, &proof).await.unwrap();
        assert!(post_state.has_state_object(&hop2.new_state));
    }
}
