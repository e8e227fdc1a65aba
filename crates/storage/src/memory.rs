use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::{Column, KeyValueStore, ScanResult, StoreError, WriteBatch, WriteOp};

type MemoryStoreMap = BTreeMap<(Column, Vec<u8>), Vec<u8>>;

/// In-memory backend. Default in tests and for wallets that keep the
/// database layer elsewhere.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("memory store lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self.inner.read().expect("memory store lock");
        Ok(guard.get(&(column, key.to_vec())).cloned())
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut guard = self.inner.write().expect("memory store lock");
        guard.insert((column, key.to_vec()), value.to_vec());
        Ok(())
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        let mut guard = self.inner.write().expect("memory store lock");
        guard.remove(&(column, key.to_vec()));
        Ok(())
    }

    fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<ScanResult, StoreError> {
        let guard = self.inner.read().expect("memory store lock");
        let mut results = Vec::new();
        for ((entry_column, key), value) in guard.iter() {
            if *entry_column == column && key.starts_with(prefix) {
                results.push((key.clone(), value.clone()));
            }
        }
        Ok(results)
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut guard = self.inner.write().expect("memory store lock");
        for op in batch.iter() {
            match op {
                WriteOp::Put { column, key, value } => {
                    guard.insert(
                        (*column, key.as_slice().to_vec()),
                        value.as_slice().to_vec(),
                    );
                }
                WriteOp::Delete { column, key } => {
                    guard.remove(&(*column, key.as_slice().to_vec()));
                }
            }
        }
        Ok(())
    }
}
