//! Operator transaction import pipeline.

use crate::SyncResult;
use plasma_chain::ChainService;
use plasma_proof::Transaction;
use plasma_providers::{OperatorClient, WalletSigner};
use plasma_services::{Service, ServiceResult};
use std::any::Any;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Imports received transactions from the operator into head state.
///
/// Each cycle asks the operator for transactions received by every wallet
/// account in the plasma block range since the last sync, unions them with
/// the persistent retry queue, fetches a history proof per transaction and
/// hands it to the chain service. Imports that fail go back on the retry
/// queue instead of being dropped.
pub struct SyncPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    chain: Arc<ChainService>,
    operator: Arc<dyn OperatorClient>,
    signer: Arc<dyn WalletSigner>,
    poll_interval: Duration,
    started: AtomicBool,
    loop_running: AtomicBool,
}

impl SyncPipeline {
    /// Create a pipeline.
    pub fn new(
        chain: Arc<ChainService>,
        operator: Arc<dyn OperatorClient>,
        signer: Arc<dyn WalletSigner>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                chain,
                operator,
                signer,
                poll_interval,
                started: AtomicBool::new(false),
                loop_running: AtomicBool::new(false),
            }),
        }
    }

    /// Run one import cycle.
    ///
    /// Exposed so tests and callers can drive the pipeline without
    /// timers.
    pub async fn sync_once(&self) -> SyncResult<()> {
        PipelineInner::sync_once(&self.inner).await
    }

    fn maybe_spawn_loop(&self) {
        if self.inner.loop_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            debug!("Sync loop started");
            while inner.started.load(Ordering::SeqCst) {
                if let Err(e) = PipelineInner::sync_once(&inner).await {
                    warn!(error = %e, "Sync cycle failed");
                }
                tokio::time::sleep(inner.poll_interval).await;
            }
            inner.loop_running.store(false, Ordering::SeqCst);
            debug!("Sync loop stopped");
        });
    }
}

impl PipelineInner {
    async fn sync_once(inner: &Arc<PipelineInner>) -> SyncResult<()> {
        if !inner.operator.is_online().await {
            debug!("Operator offline, skipping sync cycle");
            return Ok(());
        }

        let chain_store = inner.chain.chain_store();
        let cursors = inner.chain.cursors();

        let current = chain_store.get_latest_block()?;
        let last_synced = cursors.last_synced_block()?.unwrap_or_default();
        let retries = cursors.failed_transactions()?;
        if current <= last_synced && retries.is_empty() {
            return Ok(());
        }
        let first_unsynced = &last_synced + 1u32;

        // Everything received since the last cycle, plus the retry queue.
        let mut pending: Vec<Vec<u8>> = Vec::new();
        if current >= first_unsynced {
            for account in inner.signer.accounts().await? {
                pending.extend(
                    inner
                        .operator
                        .received_transactions(account, &first_unsynced, &current)
                        .await?,
                );
            }
        }
        pending.extend(retries);

        let mut seen: HashSet<Vec<u8>> = HashSet::with_capacity(pending.len());
        pending.retain(|encoded| seen.insert(encoded.clone()));

        let mut failed: Vec<Vec<u8>> = Vec::new();
        for encoded in pending {
            let transaction = match Transaction::decode(&encoded) {
                Ok(transaction) => transaction,
                Err(e) => {
                    warn!(error = %e, "Dropping undecodable received transaction");
                    continue;
                }
            };
            // Deposit-shaped transactions carry no sender and are applied
            // through the event stream, not the operator.
            if transaction.sender().is_zero() {
                continue;
            }
            if chain_store.has_transaction(&transaction.hash())? {
                continue;
            }

            let import = match inner.operator.transaction_proof(&encoded).await {
                Ok((full_transaction, proof)) => {
                    inner
                        .chain
                        .add_transaction(&full_transaction, &proof)
                        .await
                        .map(|_| ())
                }
                Err(e) => Err(e.into()),
            };
            if let Err(e) = import {
                warn!(error = %e, "Transaction import failed, queueing for retry");
                failed.push(encoded);
            }
        }

        cursors.set_failed_transactions(&failed)?;
        cursors.set_last_synced_block(&current)?;
        Ok(())
    }
}

impl Service for SyncPipeline {
    fn name(&self) -> &'static str {
        "sync"
    }

    fn dependencies(&self) -> &[&'static str] {
        &["chain", "event-handler"]
    }

    fn start(&self) -> ServiceResult<()> {
        self.inner.started.store(true, Ordering::SeqCst);
        self.maybe_spawn_loop();
        Ok(())
    }

    fn stop(&self) -> ServiceResult<()> {
        self.inner.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;
    use plasma_chain::{ChainStore, SyncCursorStore};
    use plasma_proof::{
        MerkleSumTree, OwnershipEvaluator, OwnershipState, TransactionProof,
    };
    use plasma_providers::{
        AnchorClient, MockAnchorClient, MockOperatorClient, MockSigner,
    };
    use plasma_state::{Address, StateObject};
    use plasma_storage::MemoryStorage;

    const PREDICATE: [u8; 20] = [0xee; 20];

    fn alice() -> Address {
        Address::new([0xa1; 20])
    }

    fn big(n: u64) -> BigUint {
        BigUint::from(n)
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

    struct Fixture {
        pipeline: SyncPipeline,
        chain: Arc<ChainService>,
        operator: Arc<MockOperatorClient>,
        signer: Arc<MockSigner>,
        anchor: Arc<MockAnchorClient>,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let chain_store = Arc::new(ChainStore::new(
            Arc::clone(&storage) as Arc<dyn plasma_storage::Storage>
        ));
        let cursors = Arc::new(SyncCursorStore::new(
            Arc::clone(&storage) as Arc<dyn plasma_storage::Storage>
        ));
        let anchor = Arc::new(MockAnchorClient::new());
        anchor.set_bytecode(Address::new(PREDICATE), vec![0x60]);
        let operator = Arc::new(MockOperatorClient::new());
        let signer = Arc::new(MockSigner::with_accounts(1));
        let chain = Arc::new(ChainService::new(
            chain_store,
            cursors,
            Arc::clone(&anchor) as Arc<dyn AnchorClient>,
            Arc::clone(&operator) as Arc<dyn OperatorClient>,
            Arc::new(OwnershipEvaluator::new()),
        ));
        let pipeline = SyncPipeline::new(
            Arc::clone(&chain),
            Arc::clone(&operator) as Arc<dyn OperatorClient>,
            Arc::clone(&signer) as Arc<dyn WalletSigner>,
            Duration::from_millis(10),
        );
        Fixture {
            pipeline,
            chain,
            operator,
            signer,
            anchor,
        }
    }

    /// Script a transfer to the wallet's first account at plasma block 1
    /// and return the encoded transaction.
    async fn script_transfer(fx: &Fixture) -> Vec<u8> {
        let recipient = fx.signer.accounts().await.unwrap()[0];
        let deposit = ownership_object(alice(), 0, 100, 0);
        let new_state = ownership_object(recipient, 0, 100, 1);

        let tree = MerkleSumTree::new(vec![(new_state.encode(), big(100))]).unwrap();
        fx.chain
            .chain_store()
            .set_block_header(&big(1), tree.root())
            .unwrap();

        let mut witness = alice().as_bytes().to_vec();
        witness.extend_from_slice(&[0u8; 65]);
        let transaction =
            plasma_proof::Transaction::new(1u32, tree.proof(0).unwrap(), witness, new_state);
        let encoded = transaction.encode();

        let proof = TransactionProof::new(vec![deposit], vec![transaction.clone()]);
        fx.operator
            .push_received(recipient, big(1), encoded.clone());
        fx.operator.set_proof(encoded.clone(), transaction, proof);

        fx.chain.chain_store().set_latest_block(&big(1)).await.unwrap();
        encoded
    }

    #[tokio::test]
    async fn test_import_received_transaction() {
        let fx = fixture();
        let recipient = fx.signer.accounts().await.unwrap()[0];
        script_transfer(&fx).await;

        fx.pipeline.sync_once().await.unwrap();

        let balances = fx.chain.get_balances(recipient).unwrap();
        assert_eq!(balances.get(&big(0)), Some(&big(100)));
        assert_eq!(
            fx.chain.cursors().last_synced_block().unwrap(),
            Some(big(1))
        );
        assert!(fx.chain.cursors().failed_transactions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_is_skipped_when_already_known() {
        let fx = fixture();
        let encoded = script_transfer(&fx).await;
        fx.pipeline.sync_once().await.unwrap();

        // Re-deliver the same encoded transaction in a later block range.
        let recipient = fx.signer.accounts().await.unwrap()[0];
        fx.operator.push_received(recipient, big(2), encoded);
        fx.chain.chain_store().set_latest_block(&big(2)).await.unwrap();

        let head_before = fx.chain.chain_store().load_head().unwrap();
        fx.pipeline.sync_once().await.unwrap();
        assert_eq!(fx.chain.chain_store().load_head().unwrap(), head_before);
    }

    #[tokio::test]
    async fn test_failed_import_goes_to_retry_queue() {
        let fx = fixture();
        let encoded = script_transfer(&fx).await;
        // Sabotage verification: the deposit is not recognised.
        fx.anchor.reject_deposit(big(0), big(100));

        fx.pipeline.sync_once().await.unwrap();
        assert_eq!(
            fx.chain.cursors().failed_transactions().unwrap(),
            vec![encoded.clone()]
        );

        // Once the anchor recognises the deposit again, the retry queue
        // drains even with no new received transactions.
        fx.anchor.clear_rejected_deposits();
        fx.pipeline.sync_once().await.unwrap();

        assert!(fx.chain.cursors().failed_transactions().unwrap().is_empty());
        let recipient = fx.signer.accounts().await.unwrap()[0];
        assert_eq!(
            fx.chain.get_balances(recipient).unwrap().get(&big(0)),
            Some(&big(100))
        );
    }

    #[tokio::test]
    async fn test_offline_operator_skips_cycle() {
        let fx = fixture();
        script_transfer(&fx).await;
        fx.operator.set_online(false);

        fx.pipeline.sync_once().await.unwrap();
        assert_eq!(fx.chain.cursors().last_synced_block().unwrap(), None);
    }

    #[tokio::test]
    async fn test_deposit_shaped_transactions_are_skipped() {
        let fx = fixture();
        let recipient = fx.signer.accounts().await.unwrap()[0];

        // A transaction with an empty witness has a null sender.
        let new_state = ownership_object(recipient, 0, 100, 1);
        let tree = MerkleSumTree::new(vec![(new_state.encode(), big(100))]).unwrap();
        let transaction =
            plasma_proof::Transaction::new(1u32, tree.proof(0).unwrap(), Vec::new(), new_state);
        fx.operator
            .push_received(recipient, big(1), transaction.encode());
        fx.chain.chain_store().set_latest_block(&big(1)).await.unwrap();

        fx.pipeline.sync_once().await.unwrap();
        assert!(fx.chain.get_balances(recipient).unwrap().is_empty());
        assert!(fx.chain.cursors().failed_transactions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nothing_to_do_is_a_noop() {
        let fx = fixture();
        fx.pipeline.sync_once().await.unwrap();
        assert_eq!(fx.chain.cursors().last_synced_block().unwrap(), None);
    }
}
