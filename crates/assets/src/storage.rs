//! Asset storage contract and an in-memory implementation.

use crate::summary::{AssetSummary, content_hash};
use async_trait::async_trait;
use chrono::Utc;
use recordkit_common::{AssetId, Record};
use recordkit_repo::{Lookup, StorageError};
use serde::Serialize;
use std::collections::BTreeMap;

/// Backend for an [`AssetRepository`](crate::AssetRepository).
///
/// Summaries are enumerated up front; payloads are fetched one at a time.
#[async_trait]
pub trait AssetStorage<T: Record>: Send + Sync {
    async fn enumerate_summaries(&self) -> Result<Vec<AssetSummary>, StorageError>;

    async fn load_one(&self, id: AssetId) -> Result<Lookup<T>, StorageError>;

    /// Write one asset. `summary` carries the id, path and name to store
    /// under; the returned summary reflects what was written.
    async fn persist_one(
        &mut self,
        data: &T,
        summary: &AssetSummary,
    ) -> Result<AssetSummary, StorageError>;

    async fn delete_one(&mut self, id: AssetId) -> Result<(), StorageError>;
}

/// Assets held in memory, hashed through their JSON form.
#[derive(Debug, Clone)]
pub struct MemoryAssetStorage<T> {
    entries: BTreeMap<AssetId, (AssetSummary, T)>,
    /// Persist calls left before the injected failure fires.
    fail_persist_after: Option<usize>,
    fail_reads: bool,
    persist_calls: usize,
    delete_calls: usize,
}

impl<T: Record + Serialize> MemoryAssetStorage<T> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            fail_persist_after: None,
            fail_reads: false,
            persist_calls: 0,
            delete_calls: 0,
        }
    }

    /// Seed an asset as if it had been saved earlier.
    pub fn insert(&mut self, summary: AssetSummary, data: T) -> Result<(), StorageError> {
        let stored = Self::stamp(&data, &summary)?;
        self.entries.insert(stored.id, (stored, data));
        Ok(())
    }

    pub fn get(&self, id: AssetId) -> Option<&T> {
        self.entries.get(&id).map(|(_, data)| data)
    }

    pub fn summary(&self, id: AssetId) -> Option<&AssetSummary> {
        self.entries.get(&id).map(|(summary, _)| summary)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fail the next `persist_one` call.
    pub fn fail_next_persist(&mut self) {
        self.fail_persist_after = Some(0);
    }

    /// Let `count` persists through, then fail the one after.
    pub fn fail_persist_after(&mut self, count: usize) {
        self.fail_persist_after = Some(count);
    }

    pub fn set_fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    pub fn persist_calls(&self) -> usize {
        self.persist_calls
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls
    }

    fn stamp(data: &T, summary: &AssetSummary) -> Result<AssetSummary, StorageError> {
        let bytes = serde_json::to_vec(data)
            .map_err(|e| StorageError::with_source("asset payload is not serializable", e))?;
        Ok(AssetSummary {
            modified_at: Some(Utc::now()),
            content_hash: Some(content_hash(&bytes)),
            ..summary.clone()
        })
    }
}

impl<T: Record + Serialize> Default for MemoryAssetStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Record + Serialize> AssetStorage<T> for MemoryAssetStorage<T> {
    async fn enumerate_summaries(&self) -> Result<Vec<AssetSummary>, StorageError> {
        if self.fail_reads {
            return Err(StorageError::new("asset listing unavailable"));
        }
        Ok(self.entries.values().map(|(s, _)| s.clone()).collect())
    }

    async fn load_one(&self, id: AssetId) -> Result<Lookup<T>, StorageError> {
        if self.fail_reads {
            return Err(StorageError::new(format!("load of asset {id} unavailable")));
        }
        Ok(self.get(id).cloned().into())
    }

    async fn persist_one(
        &mut self,
        data: &T,
        summary: &AssetSummary,
    ) -> Result<AssetSummary, StorageError> {
        self.persist_calls += 1;
        match self.fail_persist_after {
            Some(0) => {
                self.fail_persist_after = None;
                return Err(StorageError::new(format!(
                    "injected persist failure for asset {}",
                    summary.id
                )));
            }
            Some(n) => self.fail_persist_after = Some(n - 1),
            None => {}
        }
        let stored = Self::stamp(data, summary)?;
        self.entries.insert(stored.id, (stored.clone(), data.clone()));
        Ok(stored)
    }

    async fn delete_one(&mut self, id: AssetId) -> Result<(), StorageError> {
        self.delete_calls += 1;
        self.entries.remove(&id);
        Ok(())
    }
}
