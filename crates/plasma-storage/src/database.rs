//! RocksDB database implementation.

use crate::{Column, Storage, StorageError, StorageResult, WriteBatch};
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode,
    MultiThreaded, Options,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// RocksDB database wrapper.
pub struct Database {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref();
        info!("Opening database at {:?}", path);

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(256);
        opts.set_keep_log_file_num(1);
        opts.set_max_total_wal_size(64 * 1024 * 1024);
        opts.set_write_buffer_size(32 * 1024 * 1024);
        opts.set_max_background_jobs(2);

        // One shared block cache bounds memory across all columns.
        let block_cache = Cache::new_lru_cache(64 * 1024 * 1024);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = Column::all()
            .iter()
            .map(|col| {
                let mut cf_opts = Options::default();
                cf_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

                let mut block_opts = BlockBasedOptions::default();
                block_opts.set_block_cache(&block_cache);
                block_opts.set_cache_index_and_filter_blocks(true);
                cf_opts.set_block_based_table_factory(&block_opts);

                ColumnFamilyDescriptor::new(col.name(), cf_opts)
            })
            .collect();

        let db =
            DBWithThreadMode::<MultiThreaded>::open_cf_descriptors(&opts, path, cf_descriptors)?;

        debug!("Database opened successfully");

        Ok(Self { db: Arc::new(db) })
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> StorageResult<()> {
        for col in Column::all() {
            if let Some(handle) = self.db.cf_handle(col.name()) {
                self.db.flush_cf(&handle)?;
            }
        }
        Ok(())
    }

    fn handle(
        &self,
        col: Column,
    ) -> StorageResult<Arc<rocksdb::BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(col.name())
            .ok_or_else(|| StorageError::ColumnNotFound(col.name().to_string()))
    }
}

impl Storage for Database {
    fn get(&self, col: Column, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let handle = self.handle(col)?;
        Ok(self.db.get_cf(&handle, key)?)
    }

    fn put(&self, col: Column, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let handle = self.handle(col)?;
        self.db.put_cf(&handle, key, value)?;
        Ok(())
    }

    fn delete(&self, col: Column, key: &[u8]) -> StorageResult<()> {
        let handle = self.handle(col)?;
        self.db.delete_cf(&handle, key)?;
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut rocks_batch = rocksdb::WriteBatch::default();

        for op in batch.operations {
            let handle = self.handle(op.col)?;
            match op.kind {
                crate::batch::OperationKind::Put { value } => {
                    rocks_batch.put_cf(&handle, &op.key, &value);
                }
                crate::batch::OperationKind::Delete => {
                    rocks_batch.delete_cf(&handle, &op.key);
                }
            }
        }

        self.db.write(rocks_batch)?;
        Ok(())
    }

    fn iter(
        &self,
        col: Column,
    ) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>> {
        let handle = self.handle(col)?;
        let collected: Vec<_> = self
            .db
            .iterator_cf(&handle, IteratorMode::Start)
            .filter_map(|r| r.ok())
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .collect();
        Ok(Box::new(collected.into_iter()))
    }

    fn iter_from(
        &self,
        col: Column,
        from: &[u8],
    ) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>> {
        let handle = self.handle(col)?;
        let collected: Vec<_> = self
            .db
            .iterator_cf(
                &handle,
                IteratorMode::From(from, rocksdb::Direction::Forward),
            )
            .filter_map(|r| r.ok())
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .collect();
        Ok(Box::new(collected.into_iter()))
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_database_open_and_write() {
        let tmp = TempDir::new().unwrap();
        let db = Database::open(tmp.path()).unwrap();

        db.put(Column::Metadata, b"key1", b"value1").unwrap();
        assert_eq!(
            db.get(Column::Metadata, b"key1").unwrap(),
            Some(b"value1".to_vec())
        );

        db.delete(Column::Metadata, b"key1").unwrap();
        assert_eq!(db.get(Column::Metadata, b"key1").unwrap(), None);
    }

    #[test]
    fn test_write_batch() {
        let tmp = TempDir::new().unwrap();
        let db = Database::open(tmp.path()).unwrap();

        let mut batch = WriteBatch::new();
        batch.put(Column::Headers, b"h1", b"root1");
        batch.put(Column::Headers, b"h2", b"root2");
        batch.put(Column::Transactions, b"t1", b"txdata");
        db.write_batch(batch).unwrap();

        assert_eq!(
            db.get(Column::Headers, b"h1").unwrap(),
            Some(b"root1".to_vec())
        );
        assert_eq!(
            db.get(Column::Transactions, b"t1").unwrap(),
            Some(b"txdata".to_vec())
        );
    }

    #[test]
    fn test_iter_from_seeks_forward() {
        let tmp = TempDir::new().unwrap();
        let db = Database::open(tmp.path()).unwrap();

        for key in [b"a1", b"b2", b"c3"] {
            db.put(Column::ExitableEnds, key, b"v").unwrap();
        }

        let keys: Vec<_> = db
            .iter_from(Column::ExitableEnds, b"b0")
            .unwrap()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"b2".to_vec(), b"c3".to_vec()]);
    }
}
