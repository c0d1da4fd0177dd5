//! In-memory storage collaborators.
//!
//! Used by tests and demos in place of a real backend. Each one can be told
//! to fail its next write or its reads, to exercise failure paths.

use crate::error::StorageError;
use crate::storage::{Lookup, SingleStorage, TableStorage};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use recordkit_common::{Record, RecordKey};
use recordkit_tracking::ChangeSet;
use std::collections::BTreeMap;

/// Keyed records held in a `BTreeMap`.
#[derive(Debug, Clone)]
pub struct MemoryTableStorage<K, T> {
    records: BTreeMap<K, T>,
    /// Records served by `load_one` but hidden from `enumerate`.
    unlisted: BTreeMap<K, T>,
    fail_next_persist: bool,
    fail_reads: bool,
    persist_calls: usize,
}

impl<K: RecordKey, T: Record> MemoryTableStorage<K, T> {
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            unlisted: BTreeMap::new(),
            fail_next_persist: false,
            fail_reads: false,
            persist_calls: 0,
        }
    }

    pub fn with_records(records: impl IntoIterator<Item = (K, T)>) -> Self {
        let mut storage = Self::new();
        storage.records.extend(records);
        storage
    }

    /// Store a record that only a per-key load can find.
    pub fn insert_unlisted(&mut self, key: K, data: T) {
        self.unlisted.insert(key, data);
    }

    pub fn get(&self, key: &K) -> Option<&T> {
        self.records.get(key).or_else(|| self.unlisted.get(key))
    }

    pub fn len(&self) -> usize {
        self.records.len() + self.unlisted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fail_next_persist(&mut self) {
        self.fail_next_persist = true;
    }

    pub fn set_fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    /// Number of `persist_batch` calls, failed ones included.
    pub fn persist_calls(&self) -> usize {
        self.persist_calls
    }
}

impl<K: RecordKey, T: Record> Default for MemoryTableStorage<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: RecordKey, T: Record> TableStorage<K, T> for MemoryTableStorage<K, T> {
    fn enumerate(&self) -> BoxStream<'_, Result<(K, T), StorageError>> {
        if self.fail_reads {
            return stream::iter([Err(StorageError::new("enumeration unavailable"))]).boxed();
        }
        stream::iter(
            self.records
                .iter()
                .map(|(k, v)| Ok((k.clone(), v.clone()))),
        )
        .boxed()
    }

    async fn load_one(&self, key: &K) -> Result<Lookup<T>, StorageError> {
        if self.fail_reads {
            return Err(StorageError::new(format!("load of {key:?} unavailable")));
        }
        Ok(self.get(key).cloned().into())
    }

    async fn persist_batch(&mut self, changes: &ChangeSet<K, T>) -> Result<(), StorageError> {
        self.persist_calls += 1;
        if std::mem::take(&mut self.fail_next_persist) {
            return Err(StorageError::new("injected persist failure"));
        }
        for (key, data) in changes.added.iter().chain(&changes.modified) {
            self.unlisted.remove(key);
            self.records.insert(key.clone(), data.clone());
        }
        for key in &changes.deleted {
            self.records.remove(key);
            self.unlisted.remove(key);
        }
        Ok(())
    }
}

/// A single optional record. Loads fall back to `T::default()`.
#[derive(Debug, Clone, Default)]
pub struct MemorySingleStorage<T> {
    record: Option<T>,
    fail_next_persist: bool,
    persist_calls: usize,
}

impl<T: Record + Default> MemorySingleStorage<T> {
    pub fn new(record: T) -> Self {
        Self {
            record: Some(record),
            fail_next_persist: false,
            persist_calls: 0,
        }
    }

    /// Storage that has never been written.
    pub fn empty() -> Self {
        Self {
            record: None,
            fail_next_persist: false,
            persist_calls: 0,
        }
    }

    pub fn record(&self) -> Option<&T> {
        self.record.as_ref()
    }

    /// Overwrite the stored record behind the repository's back.
    pub fn replace(&mut self, record: T) {
        self.record = Some(record);
    }

    pub fn fail_next_persist(&mut self) {
        self.fail_next_persist = true;
    }

    pub fn persist_calls(&self) -> usize {
        self.persist_calls
    }
}

#[async_trait]
impl<T: Record + Default> SingleStorage<T> for MemorySingleStorage<T> {
    async fn load(&self) -> Result<T, StorageError> {
        Ok(self.record.clone().unwrap_or_default())
    }

    async fn persist(&mut self, record: &T) -> Result<(), StorageError> {
        self.persist_calls += 1;
        if std::mem::take(&mut self.fail_next_persist) {
            return Err(StorageError::new("injected persist failure"));
        }
        self.record = Some(record.clone());
        Ok(())
    }
}
