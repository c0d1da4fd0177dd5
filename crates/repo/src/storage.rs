//! Storage collaborator contracts.
//!
//! Repositories never touch files, databases or codecs directly; they hand
//! whole change sets to one of these traits and decide nothing about I/O
//! granularity.

use crate::error::StorageError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use recordkit_common::{Record, RecordKey};
use recordkit_tracking::ChangeSet;

/// Outcome of a single-record lookup that reached storage successfully.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Found(v) => Some(v),
            Self::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Found(v),
            None => Self::NotFound,
        }
    }
}

/// Records that carry their own key.
pub trait Keyed<K> {
    fn key(&self) -> K;
}

/// Backing store of a [`TableRepository`](crate::TableRepository).
#[async_trait]
pub trait TableStorage<K: RecordKey, T: Record>: Send + Sync {
    /// Every persisted record, produced lazily.
    fn enumerate(&self) -> BoxStream<'_, Result<(K, T), StorageError>>;

    /// A single record, for lazy loads of keys missed by enumeration.
    async fn load_one(&self, key: &K) -> Result<Lookup<T>, StorageError>;

    /// Apply one batch of changes. Either all of it lands or the call fails.
    async fn persist_batch(&mut self, changes: &ChangeSet<K, T>) -> Result<(), StorageError>;
}

/// Backing store of a [`SingleRepository`](crate::SingleRepository).
#[async_trait]
pub trait SingleStorage<T: Record>: Send + Sync {
    /// The stored record. On first run this may be a default instance.
    async fn load(&self) -> Result<T, StorageError>;

    async fn persist(&mut self, record: &T) -> Result<(), StorageError>;
}
