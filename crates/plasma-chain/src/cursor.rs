//! Sync cursors: event progress, seen events and the import retry queue.

use crate::{ChainError, ChainResult};
use num_bigint::BigUint;
use plasma_providers::AnchorEvent;
use plasma_storage::{Column, Storage, WriteBatch};
use std::sync::Arc;

/// Metadata key holding the last fully synced plasma block.
const LAST_SYNCED_KEY: &[u8] = b"lastsynced";

/// Key holding the failed-import queue.
const FAILED_QUEUE_KEY: &[u8] = b"queue";

/// Persistent cursors backing the event watcher and the sync pipeline.
pub struct SyncCursorStore {
    storage: Arc<dyn Storage>,
}

impl SyncCursorStore {
    /// Create a cursor store over a backend.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// The highest anchor block already scanned for `event_name`, if any.
    pub fn last_logged_event_block(&self, event_name: &str) -> ChainResult<Option<u64>> {
        match self.storage.get(Column::EventCursors, event_name.as_bytes())? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    ChainError::InvalidInput(format!("Bad cursor for event {}", event_name))
                })?;
                Ok(Some(u64::from_be_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    /// Advance the scan cursor for `event_name`.
    pub fn set_last_logged_event_block(&self, event_name: &str, block: u64) -> ChainResult<()> {
        self.storage.put(
            Column::EventCursors,
            event_name.as_bytes(),
            &block.to_be_bytes(),
        )?;
        Ok(())
    }

    /// Whether an event identity has ever been recorded.
    pub fn has_event(&self, event: &AnchorEvent) -> ChainResult<bool> {
        Ok(self.storage.contains(Column::SeenEvents, &event.identity())?)
    }

    /// Record event identities. Idempotent: recording twice is a no-op.
    pub fn add_events(&self, events: &[AnchorEvent]) -> ChainResult<()> {
        let mut batch = WriteBatch::new();
        for event in events {
            batch.put(Column::SeenEvents, event.identity().to_vec(), vec![1]);
        }
        self.storage.write_batch(batch)?;
        Ok(())
    }

    /// The queue of encoded transactions whose import failed.
    pub fn failed_transactions(&self) -> ChainResult<Vec<Vec<u8>>> {
        let Some(bytes) = self
            .storage
            .get(Column::FailedTransactions, FAILED_QUEUE_KEY)?
        else {
            return Ok(Vec::new());
        };
        if bytes.len() < 4 {
            return Err(ChainError::InvalidInput(
                "Failed-transaction queue truncated".to_string(),
            ));
        }
        let count = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let mut offset = 4;
        let mut queue = Vec::with_capacity(count);
        for _ in 0..count {
            if offset + 4 > bytes.len() {
                return Err(ChainError::InvalidInput(
                    "Failed-transaction queue truncated".to_string(),
                ));
            }
            let len = u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
            offset += 4;
            if offset + len > bytes.len() {
                return Err(ChainError::InvalidInput(
                    "Failed-transaction queue truncated".to_string(),
                ));
            }
            queue.push(bytes[offset..offset + len].to_vec());
            offset += len;
        }
        Ok(queue)
    }

    /// Replace the failed-transaction queue.
    pub fn set_failed_transactions(&self, queue: &[Vec<u8>]) -> ChainResult<()> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(queue.len() as u32).to_be_bytes());
        for entry in queue {
            bytes.extend_from_slice(&(entry.len() as u32).to_be_bytes());
            bytes.extend_from_slice(entry);
        }
        self.storage
            .put(Column::FailedTransactions, FAILED_QUEUE_KEY, &bytes)?;
        Ok(())
    }

    /// The last plasma block the sync pipeline fully processed, if any.
    pub fn last_synced_block(&self) -> ChainResult<Option<BigUint>> {
        Ok(self
            .storage
            .get(Column::Metadata, LAST_SYNCED_KEY)?
            .map(|bytes| BigUint::from_bytes_be(&bytes)))
    }

    /// Record the last fully synced plasma block.
    pub fn set_last_synced_block(&self, block: &BigUint) -> ChainResult<()> {
        self.storage
            .put(Column::Metadata, LAST_SYNCED_KEY, &block.to_bytes_be())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plasma_storage::MemoryStorage;
    use serde_json::Map;

    fn store() -> SyncCursorStore {
        SyncCursorStore::new(Arc::new(MemoryStorage::new()))
    }

    fn event(tx_byte: u8, log_index: u64) -> AnchorEvent {
        AnchorEvent::new("Deposit", 10, log_index, [tx_byte; 32], Map::new())
    }

    #[test]
    fn test_event_cursor_round_trip() {
        let store = store();
        assert_eq!(store.last_logged_event_block("Deposit").unwrap(), None);

        store.set_last_logged_event_block("Deposit", 42).unwrap();
        assert_eq!(store.last_logged_event_block("Deposit").unwrap(), Some(42));
        assert_eq!(store.last_logged_event_block("Other").unwrap(), None);
    }

    #[test]
    fn test_seen_events_are_idempotent() {
        let store = store();
        let a = event(1, 0);
        let b = event(1, 1);

        assert!(!store.has_event(&a).unwrap());
        store.add_events(&[a.clone(), b.clone()]).unwrap();
        store.add_events(&[a.clone()]).unwrap();

        assert!(store.has_event(&a).unwrap());
        assert!(store.has_event(&b).unwrap());
        assert!(!store.has_event(&event(2, 0)).unwrap());
    }

    #[test]
    fn test_failed_queue_round_trip() {
        let store = store();
        assert!(store.failed_transactions().unwrap().is_empty());

        let queue = vec![vec![1, 2, 3], vec![], vec![9; 40]];
        store.set_failed_transactions(&queue).unwrap();
        assert_eq!(store.failed_transactions().unwrap(), queue);

        store.set_failed_transactions(&[]).unwrap();
        assert!(store.failed_transactions().unwrap().is_empty());
    }

    #[test]
    fn test_last_synced_block_round_trip() {
        let store = store();
        assert_eq!(store.last_synced_block().unwrap(), None);
        store
            .set_last_synced_block(&BigUint::from(77u8))
            .unwrap();
        assert_eq!(
            store.last_synced_block().unwrap(),
            Some(BigUint::from(77u8))
        );
    }
}
