//! The chain service: the client's read/write face over head state.

use crate::{
    ChainError, ChainResult, ChainStore, Exit, ExitRecord, ProofVerifier, SyncCursorStore,
    STATE_LOCK,
};
use num_bigint::BigUint;
use num_traits::Zero;
use plasma_providers::{AnchorClient, AnchorReceipt, OperatorClient};
use plasma_proof::{OwnershipState, PredicateEvaluator, Transaction, TransactionProof};
use plasma_state::{Address, SnapshotManager, StateObject};
use plasma_services::{Service, ServiceError, ServiceResult};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Public facade over deposits, exits, spends and proven imports.
///
/// All head-state writers funnel through here and take the `state` mutex
/// around the load-mutate-persist sequence; verification and provider
/// calls happen before the lock so nothing awaits while it is held.
pub struct ChainService {
    chain_store: Arc<ChainStore>,
    cursors: Arc<SyncCursorStore>,
    anchor: Arc<dyn AnchorClient>,
    operator: Arc<dyn OperatorClient>,
    verifier: ProofVerifier,
    started: AtomicBool,
}

impl ChainService {
    /// Create a chain service.
    pub fn new(
        chain_store: Arc<ChainStore>,
        cursors: Arc<SyncCursorStore>,
        anchor: Arc<dyn AnchorClient>,
        operator: Arc<dyn OperatorClient>,
        evaluator: Arc<dyn PredicateEvaluator>,
    ) -> Self {
        let verifier = ProofVerifier::new(
            Arc::clone(&chain_store),
            Arc::clone(&anchor),
            evaluator,
        );
        Self {
            chain_store,
            cursors,
            anchor,
            operator,
            verifier,
            started: AtomicBool::new(false),
        }
    }

    /// The chain store behind this service.
    pub fn chain_store(&self) -> &Arc<ChainStore> {
        &self.chain_store
    }

    /// The cursor store behind this service.
    pub fn cursors(&self) -> &Arc<SyncCursorStore> {
        &self.cursors
    }

    /// Apply deposits to head state and extend the exitable frontier.
    ///
    /// Deposits whose exact range already carries an exited mark are
    /// dropped; the rest land in head state under the `state` lock.
    #[instrument(skip_all, fields(count = deposits.len()))]
    pub async fn add_deposits(&self, deposits: Vec<StateObject>) -> ChainResult<()> {
        let mut accepted = Vec::with_capacity(deposits.len());
        for deposit in deposits {
            let token = deposit_token(&deposit)?;
            if self
                .chain_store
                .is_exited(&token, &deposit.start, &deposit.end)?
            {
                debug!(start = %deposit.start, end = %deposit.end, "Skipping exited deposit");
                continue;
            }
            accepted.push((token, deposit));
        }
        if accepted.is_empty() {
            return Ok(());
        }

        {
            let _guard = self.chain_store.lock(STATE_LOCK).await;
            let mut head = self.chain_store.load_head()?;
            for (_, deposit) in &accepted {
                head.apply_deposit(deposit.clone())?;
            }
            self.chain_store.save_head(&head)?;
        }

        for (token, deposit) in &accepted {
            self.chain_store.add_exitable_end(token, &deposit.end)?;
        }
        info!(count = accepted.len(), "Deposits applied");
        Ok(())
    }

    /// Record a started exit and blank the exited range in head state.
    ///
    /// The range is overwritten with a null-owner marker object at the
    /// exit's anchor block, which removes it from balances while keeping
    /// the coin positions accounted for.
    #[instrument(skip_all, fields(owner = %exit.owner, start = %exit.start, end = %exit.end))]
    pub async fn add_exit(&self, exit: Exit) -> ChainResult<()> {
        self.chain_store.add_exit(&exit).await?;

        let marker = StateObject {
            start: exit.start.clone(),
            end: exit.end.clone(),
            block: exit.block.clone(),
            predicate: Address::zero(),
            state: OwnershipState::new(Address::zero(), exit.token.clone())
                .encode()
                .map_err(ChainError::from)?,
            implicit: false,
            implicit_start: None,
            implicit_end: None,
        };

        let _guard = self.chain_store.lock(STATE_LOCK).await;
        let mut head = self.chain_store.load_head()?;
        head.apply_deposit(marker)?;
        self.chain_store.save_head(&head)?;
        Ok(())
    }

    /// Exits recorded for an owner, with derived completion and persisted
    /// finalisation flags.
    pub async fn get_exits(&self, owner: Address) -> ChainResult<Vec<ExitRecord>> {
        let exits = self.chain_store.get_exits(owner)?;
        if exits.is_empty() {
            return Ok(Vec::new());
        }
        let head_block = self.anchor.head_block_number().await?;
        let challenge_period = self.anchor.challenge_period().await?;

        exits
            .into_iter()
            .map(|exit| {
                let completed = exit.completed(challenge_period, head_block);
                let finalized =
                    self.chain_store
                        .is_finalized(&exit.token, &exit.start, &exit.end)?;
                Ok(ExitRecord {
                    exit,
                    completed,
                    finalized,
                })
            })
            .collect()
    }

    /// Finalise every completed, unfinalised exit of an owner.
    ///
    /// Looks up the exitable end for each exit and invokes the contract;
    /// the finalised mark itself lands later, when the resulting anchor
    /// event comes back through the sync pipeline.
    pub async fn finalize_exits(&self, owner: Address) -> ChainResult<Vec<AnchorReceipt>> {
        let mut receipts = Vec::new();
        for record in self.get_exits(owner).await? {
            if !record.completed || record.finalized {
                continue;
            }
            let exit = &record.exit;
            let exitable_end = self
                .chain_store
                .get_exitable_end(&exit.token, &exit.end)?;
            let receipt = self
                .anchor
                .finalize_exit(&exit.id, &exitable_end, owner)
                .await?;
            receipts.push(receipt);
        }
        Ok(receipts)
    }

    /// Start exits covering `amount` of `token` owned by `owner`.
    pub async fn start_exit(
        &self,
        owner: Address,
        token: &BigUint,
        amount: &BigUint,
    ) -> ChainResult<Vec<AnchorReceipt>> {
        let picked = self.pick_ranges(owner, token, amount)?;
        let mut receipts = Vec::with_capacity(picked.len());
        for range in &picked {
            let receipt = self
                .anchor
                .start_exit(owner, token, &range.start, &range.end)
                .await?;
            receipts.push(receipt);
        }
        Ok(receipts)
    }

    /// Verify a transaction proof and merge the post-state into head.
    #[instrument(skip_all, fields(block = %transaction.block))]
    pub async fn add_transaction(
        &self,
        transaction: &Transaction,
        proof: &TransactionProof,
    ) -> ChainResult<()> {
        let post_state = self.verifier.apply_proof(transaction, proof).await?;

        {
            let _guard = self.chain_store.lock(STATE_LOCK).await;
            let mut head = self.chain_store.load_head()?;
            head.merge(&post_state);
            self.chain_store.save_head(&head)?;
        }

        self.chain_store.set_transaction(transaction)?;
        info!(hash = %hex::encode(transaction.hash()), "Transaction imported");
        Ok(())
    }

    /// Forward an encoded transaction to the operator.
    pub async fn send_transaction(&self, transaction: &Transaction) -> ChainResult<String> {
        Ok(self
            .operator
            .send_transaction(&transaction.encode())
            .await?)
    }

    /// Deposit coins on the anchor chain.
    pub async fn deposit(
        &self,
        owner: Address,
        token: &BigUint,
        amount: &BigUint,
    ) -> ChainResult<AnchorReceipt> {
        if amount.is_zero() {
            return Err(ChainError::InvalidInput(
                "Deposit amount must be positive".to_string(),
            ));
        }
        Ok(self.anchor.deposit(owner, token, amount).await?)
    }

    /// Sum of owned range lengths per token.
    pub fn get_balances(&self, owner: Address) -> ChainResult<BTreeMap<BigUint, BigUint>> {
        let mut balances = BTreeMap::new();
        for (token, range) in self.owned_ranges(owner)? {
            let entry = balances.entry(token).or_insert_with(BigUint::zero);
            *entry += range.length();
        }
        Ok(balances)
    }

    /// Ranges in head state owned by `owner`, across all tokens.
    pub fn get_owned_ranges(&self, owner: Address) -> ChainResult<Vec<StateObject>> {
        Ok(self
            .owned_ranges(owner)?
            .into_iter()
            .map(|(_, range)| range)
            .collect())
    }

    /// Select owned ranges of `token` summing to `amount`.
    ///
    /// Consumes whole ranges smallest-first and splits a prefix off the
    /// final range when it overshoots. An amount of zero selects nothing;
    /// exhausting the owned set first fails with
    /// [`ChainError::InsufficientBalance`]. The picked ranges come back
    /// sorted by start.
    pub fn pick_ranges(
        &self,
        owner: Address,
        token: &BigUint,
        amount: &BigUint,
    ) -> ChainResult<Vec<StateObject>> {
        if amount.is_zero() {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<StateObject> = self
            .owned_ranges(owner)?
            .into_iter()
            .filter(|(t, _)| t == token)
            .map(|(_, range)| range)
            .collect();
        // Descending by size; the smallest sits at the back.
        candidates.sort_by(|a, b| b.length().cmp(&a.length()).then(a.start.cmp(&b.start)));

        let mut remaining = amount.clone();
        let mut picked = Vec::new();
        while !remaining.is_zero() {
            let Some(range) = candidates.pop() else {
                return Err(ChainError::InsufficientBalance {
                    token: token.to_string(),
                    missing: remaining.to_string(),
                });
            };
            let size = range.length();
            if size <= remaining {
                remaining -= size;
                picked.push(range);
            } else {
                let mut prefix = range.clone();
                prefix.end = &range.start + &remaining;
                remaining = BigUint::zero();
                picked.push(prefix);
            }
        }

        picked.sort_by(|a, b| a.start.cmp(&b.start));
        Ok(picked)
    }

    /// The last plasma block the sync pipeline fully processed.
    pub fn last_synced_block(&self) -> ChainResult<Option<BigUint>> {
        self.cursors.last_synced_block()
    }

    /// Stored block commitment for a plasma block.
    pub fn get_block_header(&self, block: &BigUint) -> ChainResult<[u8; 32]> {
        self.chain_store
            .get_block_header(block)?
            .ok_or_else(|| ChainError::NotFound(format!("header for block {}", block)))
    }

    /// Stored transaction by hash.
    pub fn get_transaction(&self, hash: &[u8; 32]) -> ChainResult<Transaction> {
        self.chain_store
            .get_transaction(hash)?
            .ok_or_else(|| ChainError::NotFound(format!("transaction 0x{}", hex::encode(hash))))
    }

    /// Owned `(token, range)` pairs decoded from head state.
    ///
    /// Ranges whose state bytes do not decode as ownership data belong to
    /// foreign predicates and are skipped, as are null-owner exit markers.
    fn owned_ranges(&self, owner: Address) -> ChainResult<Vec<(BigUint, StateObject)>> {
        let head = self.chain_store.load_head()?;
        let mut owned = Vec::new();
        for range in head.state() {
            let Ok(ownership) = OwnershipState::decode(&range.state) else {
                continue;
            };
            if ownership.owner.is_zero() || ownership.owner != owner {
                continue;
            }
            owned.push((ownership.token, range));
        }
        Ok(owned)
    }
}

impl Service for ChainService {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn start(&self) -> ServiceResult<()> {
        let head = self.chain_store.load_head().map_err(|e| {
            warn!(error = %e, "Failed to load head state");
            ServiceError::Internal {
                service: "chain".to_string(),
                message: e.to_string(),
            }
        })?;
        info!(ranges = head.len(), "Chain service starting");
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> ServiceResult<()> {
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Token a deposit is denominated in, from its ownership state data.
fn deposit_token(deposit: &StateObject) -> ChainResult<BigUint> {
    let ownership = OwnershipState::decode(&deposit.state)
        .map_err(|e| ChainError::InvalidInput(format!("Deposit without ownership data: {}", e)))?;
    Ok(ownership.token)
}
