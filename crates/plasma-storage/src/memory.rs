//! Ordered in-memory storage backend.

use crate::{Column, Storage, StorageResult, WriteBatch};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// In-memory storage backed by ordered maps.
///
/// Matches the iteration semantics of the RocksDB backend, which makes it
/// the backend of choice for tests and for ephemeral client runs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    columns: RwLock<HashMap<Column, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStorage {
    /// Create an empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, col: Column, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .columns
            .read()
            .get(&col)
            .and_then(|map| map.get(key).cloned()))
    }

    fn put(&self, col: Column, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.columns
            .write()
            .entry(col)
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, col: Column, key: &[u8]) -> StorageResult<()> {
        if let Some(map) = self.columns.write().get_mut(&col) {
            map.remove(key);
        }
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut columns = self.columns.write();
        for op in batch.operations {
            let map = columns.entry(op.col).or_default();
            match op.kind {
                crate::batch::OperationKind::Put { value } => {
                    map.insert(op.key, value);
                }
                crate::batch::OperationKind::Delete => {
                    map.remove(&op.key);
                }
            }
        }
        Ok(())
    }

    fn iter(
        &self,
        col: Column,
    ) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>> {
        let collected: Vec<_> = self
            .columns
            .read()
            .get(&col)
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        Ok(Box::new(collected.into_iter()))
    }

    fn iter_from(
        &self,
        col: Column,
        from: &[u8],
    ) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>> {
        let collected: Vec<_> = self
            .columns
            .read()
            .get(&col)
            .map(|map| {
                map.range(from.to_vec()..)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Box::new(collected.into_iter()))
    }
}
