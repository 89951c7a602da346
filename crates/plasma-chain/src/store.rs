//! Logical chain schema over the storage backend.

use crate::{ChainError, ChainResult, Exit, KeyedLocks};
use num_bigint::BigUint;
use plasma_proof::Transaction;
use plasma_state::{Address, SnapshotManager};
use plasma_storage::{Column, Storage, WriteBatch};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

/// Name of the mutex serialising head-state transitions.
pub const STATE_LOCK: &str = "state";

/// Name of the mutex serialising latest-block bumps.
const LATEST_BLOCK_LOCK: &str = "latestblock";

/// Metadata key holding the latest committed plasma block.
const LATEST_BLOCK_KEY: &[u8] = b"latestblock";

/// Key holding the persisted head state.
const HEAD_STATE_KEY: &[u8] = b"latest";

/// Byte width of the token prefix inside a typed value.
const TYPED_TOKEN_BYTES: usize = 8;

/// Byte width of the value suffix inside a typed value.
const TYPED_VALUE_BYTES: usize = 24;

/// Build the 32-hex-byte sort key partitioning by token then value.
///
/// The token occupies the first 8 bytes and the value the remaining 24,
/// both big-endian, rendered as 64 lowercase hex characters. Keys for a
/// fixed token are strictly increasing in the value, and distinct tokens
/// occupy disjoint key regions.
pub fn typed_value(token: &BigUint, value: &BigUint) -> ChainResult<String> {
    let token_raw = token.to_bytes_be();
    if token_raw.len() > TYPED_TOKEN_BYTES {
        return Err(ChainError::InvalidInput(format!(
            "Token {} exceeds {} bytes",
            token, TYPED_TOKEN_BYTES
        )));
    }
    let value_raw = value.to_bytes_be();
    if value_raw.len() > TYPED_VALUE_BYTES {
        return Err(ChainError::InvalidInput(format!(
            "Value {} exceeds {} bytes",
            value, TYPED_VALUE_BYTES
        )));
    }

    let mut bytes = [0u8; TYPED_TOKEN_BYTES + TYPED_VALUE_BYTES];
    bytes[TYPED_TOKEN_BYTES - token_raw.len()..TYPED_TOKEN_BYTES].copy_from_slice(&token_raw);
    bytes[TYPED_TOKEN_BYTES + TYPED_VALUE_BYTES - value_raw.len()..].copy_from_slice(&value_raw);
    Ok(hex::encode(bytes))
}

/// ASCII key for per-range marks: `token:start:end`, decimal components.
fn range_key(token: &BigUint, start: &BigUint, end: &BigUint) -> Vec<u8> {
    format!("{}:{}:{}", token, start, end).into_bytes()
}

/// The chain store: every persisted namespace of the client.
pub struct ChainStore {
    storage: Arc<dyn Storage>,
    locks: KeyedLocks,
}

impl ChainStore {
    /// Create a chain store over a backend.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            locks: KeyedLocks::new(),
        }
    }

    /// Acquire one of the named mutexes guarding multi-step updates.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        self.locks.acquire(key).await
    }

    // --- Transactions ---

    /// Persist an encoded transaction under its hash. Idempotent.
    pub fn set_transaction(&self, transaction: &Transaction) -> ChainResult<()> {
        self.storage.put(
            Column::Transactions,
            &transaction.hash(),
            &transaction.encode(),
        )?;
        Ok(())
    }

    /// Fetch a transaction by hash.
    pub fn get_transaction(&self, hash: &[u8; 32]) -> ChainResult<Option<Transaction>> {
        match self.storage.get(Column::Transactions, hash)? {
            Some(bytes) => Ok(Some(Transaction::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Whether a transaction is stored.
    pub fn has_transaction(&self, hash: &[u8; 32]) -> ChainResult<bool> {
        Ok(self.storage.contains(Column::Transactions, hash)?)
    }

    // --- Block headers ---

    /// Persist a block root. First write wins; commitments are immutable.
    pub fn set_block_header(&self, block: &BigUint, root: [u8; 32]) -> ChainResult<()> {
        let key = block.to_string().into_bytes();
        if self.storage.contains(Column::Headers, &key)? {
            debug!(block = %block, "Header already stored, keeping first write");
            return Ok(());
        }
        self.storage.put(Column::Headers, &key, &root)?;
        Ok(())
    }

    /// Fetch a block root, padded to 32 bytes.
    pub fn get_block_header(&self, block: &BigUint) -> ChainResult<Option<[u8; 32]>> {
        let key = block.to_string().into_bytes();
        match self.storage.get(Column::Headers, &key)? {
            Some(bytes) => {
                if bytes.len() > 32 {
                    return Err(ChainError::InvalidInput(format!(
                        "Stored header for block {} is {} bytes",
                        block,
                        bytes.len()
                    )));
                }
                let mut root = [0u8; 32];
                root[32 - bytes.len()..].copy_from_slice(&bytes);
                Ok(Some(root))
            }
            None => Ok(None),
        }
    }

    // --- Latest block ---

    /// The highest plasma block observed from block-submission events.
    pub fn get_latest_block(&self) -> ChainResult<BigUint> {
        Ok(self
            .storage
            .get(Column::Metadata, LATEST_BLOCK_KEY)?
            .map(|bytes| BigUint::from_bytes_be(&bytes))
            .unwrap_or_default())
    }

    /// Raise the latest block. Monotonic: lower values are ignored.
    pub async fn set_latest_block(&self, block: &BigUint) -> ChainResult<()> {
        let _guard = self.locks.acquire(LATEST_BLOCK_LOCK).await;
        let current = self.get_latest_block()?;
        if *block > current {
            self.storage
                .put(Column::Metadata, LATEST_BLOCK_KEY, &block.to_bytes_be())?;
        }
        Ok(())
    }

    // --- Exits ---

    /// Record a started exit: marks the range exited and appends to the
    /// owner's exit list under the per-owner mutex.
    pub async fn add_exit(&self, exit: &Exit) -> ChainResult<()> {
        self.mark_exited(&exit.token, &exit.start, &exit.end)?;

        let key = exit.owner.as_bytes().to_vec();
        let _guard = self
            .locks
            .acquire(&format!("exits:{}", exit.owner))
            .await;
        let mut exits = self.get_exits(exit.owner)?;
        exits.push(exit.clone());

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(exits.len() as u32).to_be_bytes());
        for entry in &exits {
            let encoded = entry.encode();
            bytes.extend_from_slice(&(encoded.len() as u32).to_be_bytes());
            bytes.extend_from_slice(&encoded);
        }
        self.storage.put(Column::Exits, &key, &bytes)?;
        Ok(())
    }

    /// Every exit recorded for an owner, in insertion order.
    pub fn get_exits(&self, owner: Address) -> ChainResult<Vec<Exit>> {
        let Some(bytes) = self.storage.get(Column::Exits, owner.as_bytes())? else {
            return Ok(Vec::new());
        };
        if bytes.len() < 4 {
            return Err(ChainError::InvalidInput("Exit list truncated".to_string()));
        }
        let count = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let mut offset = 4;
        let mut exits = Vec::with_capacity(count);
        for _ in 0..count {
            if offset + 4 > bytes.len() {
                return Err(ChainError::InvalidInput("Exit list truncated".to_string()));
            }
            let len = u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
            offset += 4;
            if offset + len > bytes.len() {
                return Err(ChainError::InvalidInput("Exit list truncated".to_string()));
            }
            let (exit, _) = Exit::decode_from(&bytes[offset..offset + len])?;
            exits.push(exit);
            offset += len;
        }
        Ok(exits)
    }

    /// Mark a range as exited. Set-only.
    pub fn mark_exited(
        &self,
        token: &BigUint,
        start: &BigUint,
        end: &BigUint,
    ) -> ChainResult<()> {
        self.storage
            .put(Column::ExitedRanges, &range_key(token, start, end), &[1])?;
        Ok(())
    }

    /// Whether a range carries an exited mark.
    pub fn is_exited(&self, token: &BigUint, start: &BigUint, end: &BigUint) -> ChainResult<bool> {
        Ok(self
            .storage
            .contains(Column::ExitedRanges, &range_key(token, start, end))?)
    }

    /// Mark an exit finalised. Requires the matching exited mark.
    pub fn mark_finalized(
        &self,
        token: &BigUint,
        start: &BigUint,
        end: &BigUint,
    ) -> ChainResult<()> {
        if !self.is_exited(token, start, end)? {
            return Err(ChainError::InvalidInput(format!(
                "No started exit for {}:[{}, {})",
                token, start, end
            )));
        }
        self.storage.put(
            Column::FinalizedRanges,
            &range_key(token, start, end),
            &[1],
        )?;
        Ok(())
    }

    /// Whether a range carries a finalised mark.
    pub fn is_finalized(
        &self,
        token: &BigUint,
        start: &BigUint,
        end: &BigUint,
    ) -> ChainResult<bool> {
        Ok(self
            .storage
            .contains(Column::FinalizedRanges, &range_key(token, start, end))?)
    }

    // --- Exitable ends ---

    /// Record an exitable end. The frontier only grows.
    pub fn add_exitable_end(&self, token: &BigUint, end: &BigUint) -> ChainResult<()> {
        let key = typed_value(token, end)?;
        let value = format!("0x{:x}", end);
        self.storage
            .put(Column::ExitableEnds, key.as_bytes(), value.as_bytes())?;
        Ok(())
    }

    /// The smallest recorded exitable end at or above `end` for `token`.
    ///
    /// Scans forward from `typed_value(token, end)`; a hit under a
    /// different token prefix means the frontier has no entry for this
    /// token at or above `end`.
    pub fn get_exitable_end(&self, token: &BigUint, end: &BigUint) -> ChainResult<BigUint> {
        let from = typed_value(token, end)?;
        let token_prefix = from[..TYPED_TOKEN_BYTES * 2].to_string();

        let mut iter = self.storage.iter_from(Column::ExitableEnds, from.as_bytes())?;
        if let Some((key, value)) = iter.next() {
            let key = String::from_utf8(key)
                .map_err(|_| ChainError::InvalidInput("Non-ASCII exitable key".to_string()))?;
            if key.starts_with(&token_prefix) {
                let text = String::from_utf8(value)
                    .map_err(|_| ChainError::InvalidInput("Non-ASCII exitable end".to_string()))?;
                let digits = text.strip_prefix("0x").unwrap_or(&text);
                return BigUint::parse_bytes(digits.as_bytes(), 16).ok_or_else(|| {
                    ChainError::InvalidInput(format!("Bad exitable end value {}", text))
                });
            }
        }
        Err(ChainError::NotFound(format!(
            "Exitable end for token {} at or above {}",
            token, end
        )))
    }

    // --- Head state ---

    /// Load the persisted head state, empty when none was saved yet.
    pub fn load_head(&self) -> ChainResult<SnapshotManager> {
        match self.storage.get(Column::HeadState, HEAD_STATE_KEY)? {
            Some(bytes) => Ok(SnapshotManager::decode(&bytes)?),
            None => Ok(SnapshotManager::new()),
        }
    }

    /// Persist the head state.
    pub fn save_head(&self, head: &SnapshotManager) -> ChainResult<()> {
        self.storage
            .put(Column::HeadState, HEAD_STATE_KEY, &head.encode())?;
        Ok(())
    }

    // --- Predicate bytecode ---

    /// Persist predicate bytecode.
    pub fn set_predicate_bytecode(&self, address: Address, code: &[u8]) -> ChainResult<()> {
        self.storage
            .put(Column::Predicates, address.as_bytes(), code)?;
        Ok(())
    }

    /// Fetch predicate bytecode.
    pub fn get_predicate_bytecode(&self, address: Address) -> ChainResult<Option<Vec<u8>>> {
        Ok(self.storage.get(Column::Predicates, address.as_bytes())?)
    }

    /// Write several puts atomically.
    pub fn write_batch(&self, batch: WriteBatch) -> ChainResult<()> {
        self.storage.write_batch(batch)?;
        Ok(())
    }
}
