use crate::error::RepositoryError;
use crate::storage::{Keyed, Lookup, TableStorage};
use futures::TryStreamExt;
use recordkit_common::{PropertyAccess, PropertyValue, Record, RecordKey};
use recordkit_tracking::{
    ChangeCounts, ChangeState, ChangeTracker, PropertyChange, SubscriptionId,
};
use tracing::Instrument;

/// Table repository configuration.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Fall back to a per-key storage load when `get` misses a key that
    /// enumeration did not produce.
    pub lazy_item_load: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            lazy_item_load: true,
        }
    }
}

/// Editable keyed collection backed by a [`TableStorage`].
///
/// Reads see working copies over baselines; writes are tracked in a
/// [`ChangeTracker`] and reach storage only through [`save`](Self::save),
/// as one batch.
pub struct TableRepository<K: RecordKey, T: Record, S> {
    tracker: ChangeTracker<K, T>,
    storage: S,
    config: TableConfig,
    initialized: bool,
}

impl<K, T, S> TableRepository<K, T, S>
where
    K: RecordKey,
    T: Record,
    S: TableStorage<K, T>,
{
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, TableConfig::default())
    }

    pub fn with_config(storage: S, config: TableConfig) -> Self {
        Self {
            tracker: ChangeTracker::new(),
            storage,
            config,
            initialized: false,
        }
    }

    /// Load a baseline for every persisted record. No-op once initialized.
    ///
    /// A failed enumeration leaves the repository uninitialized and empty.
    pub async fn initialize(&mut self) -> Result<(), RepositoryError> {
        if self.initialized {
            return Ok(());
        }
        self.load_all()
            .instrument(tracing::info_span!("table_initialize"))
            .await
    }

    /// Discard all pending edits and load everything again.
    pub async fn reload(&mut self) -> Result<(), RepositoryError> {
        self.initialized = false;
        self.initialize().await
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    async fn load_all(&mut self) -> Result<(), RepositoryError> {
        self.tracker.clear();
        let mut records = self.storage.enumerate();
        let mut count = 0usize;
        loop {
            match records.try_next().await {
                Ok(Some((key, data))) => {
                    self.tracker.set_baseline(key, &data);
                    count += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    drop(records);
                    tracing::warn!(error = %e, loaded = count, "enumeration failed");
                    self.tracker.clear();
                    return Err(e.into());
                }
            }
        }
        self.initialized = true;
        tracing::info!(records = count, "table initialized");
        Ok(())
    }

    /// The record under `key`, or `None` if it does not exist or is pending
    /// deletion.
    ///
    /// Initializes on first use. A key unknown to the loaded set is looked up
    /// individually when [`TableConfig::lazy_item_load`] is on; storage errors
    /// from that lookup propagate rather than reading as "absent".
    pub async fn get(&mut self, key: &K) -> Result<Option<&T>, RepositoryError> {
        self.initialize().await?;
        if self.tracker.state(key) == ChangeState::Deleted {
            return Ok(None);
        }
        if self.tracker.current(key).is_none() && self.config.lazy_item_load {
            match self.storage.load_one(key).await? {
                Lookup::Found(data) => {
                    tracing::debug!(?key, "lazily loaded record");
                    self.tracker.set_baseline(key.clone(), &data);
                }
                Lookup::NotFound => return Ok(None),
            }
        }
        Ok(self.tracker.current(key))
    }

    /// Every live record, in key order.
    pub async fn get_all(&mut self) -> Result<Vec<(K, &T)>, RepositoryError> {
        self.find(|_| true).await
    }

    /// Live records matching `predicate`, in key order.
    pub async fn find(
        &mut self,
        mut predicate: impl FnMut(&T) -> bool,
    ) -> Result<Vec<(K, &T)>, RepositoryError> {
        self.initialize().await?;
        let tracker = &self.tracker;
        Ok(tracker
            .logical_keys()
            .into_iter()
            .filter_map(|k| tracker.current(&k).map(|v| (k, v)))
            .filter(|(_, v)| predicate(*v))
            .collect())
    }

    /// Keys of all live records loaded so far.
    pub fn keys(&self) -> Vec<K> {
        self.tracker.logical_keys().into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.tracker.logical_keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &K) -> bool {
        self.tracker.contains(key)
    }

    /// Track a new record. Fails if `key` is already live.
    pub fn add(&mut self, key: K, data: T) -> Result<(), RepositoryError> {
        self.ensure_initialized()?;
        if self.tracker.contains(&key) {
            return Err(RepositoryError::duplicate(&key));
        }
        self.tracker.mark_added(key, data);
        Ok(())
    }

    /// Add a record under the key it carries.
    pub fn add_keyed(&mut self, data: T) -> Result<K, RepositoryError>
    where
        T: Keyed<K>,
    {
        let key = data.key();
        self.add(key.clone(), data)?;
        Ok(key)
    }

    /// Replace a live record wholesale.
    pub fn update(&mut self, key: &K, data: T) -> Result<(), RepositoryError> {
        self.ensure_initialized()?;
        if !self.tracker.contains(key) {
            return Err(RepositoryError::not_found(key));
        }
        self.tracker.replace_working_copy(key, data)?;
        Ok(())
    }

    /// Mutate a live record in place. The key becomes modified only if the
    /// result differs from its baseline.
    pub fn edit<R>(&mut self, key: &K, f: impl FnOnce(&mut T) -> R) -> Result<R, RepositoryError> {
        self.ensure_initialized()?;
        if !self.tracker.contains(key) {
            return Err(RepositoryError::not_found(key));
        }
        Ok(self.tracker.edit(key, f)?)
    }

    /// Mark a live record for deletion. Returns false if it was not live.
    pub fn remove(&mut self, key: &K) -> bool {
        if !self.tracker.contains(key) {
            return false;
        }
        self.tracker.mark_deleted(key)
    }

    /// Persist every pending change in one storage call.
    ///
    /// On failure nothing is promoted, so calling again retries the same
    /// batch.
    pub async fn save(&mut self) -> Result<ChangeCounts, RepositoryError> {
        let changes = self.tracker.change_set();
        let counts = changes.counts();
        if changes.is_empty() {
            tracing::debug!("save skipped, nothing to persist");
            return Ok(counts);
        }
        let span = tracing::info_span!(
            "table_save",
            added = counts.added,
            modified = counts.modified,
            deleted = counts.deleted
        );
        if let Err(e) = self.storage.persist_batch(&changes).instrument(span).await {
            tracing::warn!(error = %e, "save failed, changes kept");
            return Err(e.into());
        }
        self.tracker.refresh_baselines_after_save();
        tracing::info!(%counts, "table saved");
        Ok(counts)
    }

    pub fn state(&self, key: &K) -> ChangeState {
        self.tracker.state(key)
    }

    pub fn has_changes(&self) -> bool {
        self.tracker.has_changes()
    }

    pub fn change_counts(&self) -> ChangeCounts {
        self.tracker.change_counts()
    }

    pub fn changed_keys(&self) -> Vec<K> {
        self.tracker.changed_keys()
    }

    pub fn revert(&mut self, key: &K) -> bool {
        self.tracker.revert(key)
    }

    pub fn revert_all(&mut self) {
        self.tracker.revert_all();
    }

    pub fn is_property_modified(&self, key: &K, property: &str) -> bool {
        self.tracker.is_property_modified(key, property)
    }

    pub fn modified_properties(&self, key: &K) -> Vec<&str> {
        self.tracker.modified_properties(key).collect()
    }

    pub fn property_baseline(&self, key: &K, property: &str) -> Option<&PropertyValue> {
        self.tracker.property_baseline(key, property)
    }

    pub fn property_change(&self, key: &K, property: &str) -> Option<&PropertyChange> {
        self.tracker.property_change(key, property)
    }

    /// Listen for has-changes transitions.
    pub fn subscribe(&mut self, listener: impl FnMut(bool) + Send + 'static) -> SubscriptionId {
        self.tracker.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.tracker.unsubscribe(id)
    }

    pub fn tracker(&self) -> &ChangeTracker<K, T> {
        &self.tracker
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    fn ensure_initialized(&self) -> Result<(), RepositoryError> {
        if self.initialized {
            Ok(())
        } else {
            Err(RepositoryError::NotInitialized)
        }
    }
}

impl<K, T, S> TableRepository<K, T, S>
where
    K: RecordKey,
    T: Record + PropertyAccess,
    S: TableStorage<K, T>,
{
    /// Set one property of a live record. Returns whether it now differs
    /// from the baseline; always false for added records, which have none.
    pub fn set_property(
        &mut self,
        key: &K,
        property: &str,
        value: PropertyValue,
    ) -> Result<bool, RepositoryError> {
        self.ensure_initialized()?;
        if !self.tracker.contains(key) {
            return Err(RepositoryError::not_found(key));
        }
        if self.tracker.state(key) == ChangeState::Added {
            let written = self.tracker.edit(key, |record| record.try_set(property, value))?;
            if !written {
                return Err(RepositoryError::PropertyRejected {
                    key: format!("{key:?}"),
                    property: property.to_string(),
                });
            }
            return Ok(false);
        }
        Ok(self.tracker.track_property_change(key, property, value)?)
    }

    pub fn revert_property(&mut self, key: &K, property: &str) -> bool {
        self.tracker.revert_property(key, property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTableStorage;
    use pollster::block_on;
    use recordkit_common::SerdeProperties;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: u32,
        label: String,
    }

    impl SerdeProperties for Row {}

    impl Keyed<u32> for Row {
        fn key(&self) -> u32 {
            self.id
        }
    }

    fn row(id: u32, label: &str) -> Row {
        Row {
            id,
            label: label.into(),
        }
    }

    fn repo_with(rows: &[(u32, &str)]) -> TableRepository<u32, Row, MemoryTableStorage<u32, Row>> {
        let storage = MemoryTableStorage::with_records(rows.iter().map(|(k, l)| (*k, row(*k, l))));
        let mut repo = TableRepository::new(storage);
        block_on(repo.initialize()).unwrap();
        repo
    }

    #[test]
    fn initialize_loads_baselines() {
        let repo = repo_with(&[(1, "a"), (2, "b")]);
        assert!(repo.is_initialized());
        assert_eq!(repo.keys(), vec![1, 2]);
        assert!(!repo.has_changes());
    }

    #[test]
    fn initialize_is_idempotent() {
        let mut repo = repo_with(&[(1, "a")]);
        repo.add(2, row(2, "b")).unwrap();
        block_on(repo.initialize()).unwrap();
        assert_eq!(repo.state(&2), ChangeState::Added);
    }

    #[test]
    fn failed_enumeration_leaves_uninitialized() {
        let mut storage = MemoryTableStorage::with_records([(1, row(1, "a"))]);
        storage.set_fail_reads(true);
        let mut repo = TableRepository::new(storage);
        assert!(matches!(
            block_on(repo.initialize()),
            Err(RepositoryError::Storage(_))
        ));
        assert!(!repo.is_initialized());
        assert!(repo.is_empty());
        assert!(matches!(
            repo.add(2, row(2, "b")),
            Err(RepositoryError::NotInitialized)
        ));
    }

    #[test]
    fn get_lazily_initializes() {
        let storage = MemoryTableStorage::with_records([(1, row(1, "a"))]);
        let mut repo = TableRepository::new(storage);
        assert_eq!(block_on(repo.get(&1)).unwrap(), Some(&row(1, "a")));
        assert!(repo.is_initialized());
    }

    #[test]
    fn get_prefers_working_copy() {
        let mut repo = repo_with(&[(1, "a")]);
        repo.update(&1, row(1, "a2")).unwrap();
        assert_eq!(block_on(repo.get(&1)).unwrap().unwrap().label, "a2");
    }

    #[test]
    fn get_lazy_loads_unlisted_record() {
        let mut storage = MemoryTableStorage::new();
        storage.insert_unlisted(5, row(5, "hidden"));
        let mut repo = TableRepository::new(storage);
        assert_eq!(block_on(repo.get(&5)).unwrap(), Some(&row(5, "hidden")));
        assert!(repo.tracker().has_baseline(&5));
        assert_eq!(repo.state(&5), ChangeState::Unchanged);
        assert_eq!(block_on(repo.get(&6)).unwrap(), None);
    }

    #[test]
    fn lazy_load_disabled_reads_absent() {
        let mut storage = MemoryTableStorage::new();
        storage.insert_unlisted(5, row(5, "hidden"));
        let config = TableConfig {
            lazy_item_load: false,
        };
        let mut repo = TableRepository::with_config(storage, config);
        assert_eq!(block_on(repo.get(&5)).unwrap(), None);
    }

    #[test]
    fn lazy_load_error_is_not_absence() {
        let mut repo = repo_with(&[(1, "a")]);
        repo.storage_mut().set_fail_reads(true);
        assert_eq!(block_on(repo.get(&1)).unwrap(), Some(&row(1, "a")));
        assert!(matches!(
            block_on(repo.get(&9)),
            Err(RepositoryError::Storage(_))
        ));
    }

    #[test]
    fn get_hides_deleted() {
        let mut repo = repo_with(&[(1, "a")]);
        assert!(repo.remove(&1));
        assert_eq!(block_on(repo.get(&1)).unwrap(), None);
    }

    #[test]
    fn add_duplicate_fails() {
        let mut repo = repo_with(&[(1, "a")]);
        assert!(matches!(
            repo.add(1, row(1, "again")),
            Err(RepositoryError::DuplicateKey { .. })
        ));
        repo.add_keyed(row(2, "b")).unwrap();
        assert!(repo.add_keyed(row(2, "b")).is_err());
    }

    #[test]
    fn update_missing_fails() {
        let mut repo = repo_with(&[(1, "a")]);
        assert!(matches!(
            repo.update(&7, row(7, "x")),
            Err(RepositoryError::NotFound { .. })
        ));
        repo.remove(&1);
        assert!(repo.update(&1, row(1, "x")).is_err());
    }

    #[test]
    fn update_of_added_stays_added() {
        let mut repo = repo_with(&[]);
        repo.add(3, row(3, "c")).unwrap();
        repo.update(&3, row(3, "c2")).unwrap();
        assert_eq!(repo.state(&3), ChangeState::Added);
        assert_eq!(repo.tracker().current(&3).unwrap().label, "c2");
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut repo = repo_with(&[(1, "a")]);
        assert!(!repo.remove(&9));
        assert!(!repo.has_changes());
    }

    #[test]
    fn find_sees_working_copies() {
        let mut repo = repo_with(&[(1, "a"), (2, "b")]);
        repo.update(&2, row(2, "match")).unwrap();
        repo.add(3, row(3, "match")).unwrap();
        repo.remove(&1);
        let hits: Vec<u32> = block_on(repo.find(|r| r.label == "match"))
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(hits, vec![2, 3]);
        assert_eq!(block_on(repo.get_all()).unwrap().len(), 2);
    }

    #[test]
    fn set_property_tracks_and_reverts() {
        let mut repo = repo_with(&[(1, "a")]);
        assert!(repo.set_property(&1, "label", json!("z")).unwrap());
        assert_eq!(repo.modified_properties(&1), vec!["label"]);
        assert_eq!(repo.property_baseline(&1, "label"), Some(&json!("a")));
        assert!(repo.revert_property(&1, "label"));
        assert_eq!(repo.state(&1), ChangeState::Unchanged);
        assert_eq!(block_on(repo.get(&1)).unwrap().unwrap().label, "a");
    }

    #[test]
    fn update_after_set_property_drops_stale_diff() {
        let mut repo = repo_with(&[(1, "a")]);
        repo.set_property(&1, "label", json!("b")).unwrap();
        repo.update(&1, row(1, "a")).unwrap();

        assert!(!repo.is_property_modified(&1, "label"));
        assert!(repo.property_change(&1, "label").is_none());
        assert!(repo.modified_properties(&1).is_empty());
        assert_eq!(repo.state(&1), ChangeState::Modified);
    }

    #[test]
    fn set_property_on_added_writes_without_diff() {
        let mut repo = repo_with(&[]);
        repo.add(4, row(4, "d")).unwrap();
        assert!(!repo.set_property(&4, "label", json!("d2")).unwrap());
        assert_eq!(repo.tracker().current(&4).unwrap().label, "d2");
        assert!(repo.set_property(&4, "missing", json!(1)).is_err());
    }

    #[test]
    fn save_with_nothing_pending_skips_storage() {
        let mut repo = repo_with(&[(1, "a")]);
        let counts = block_on(repo.save()).unwrap();
        assert_eq!(counts.total(), 0);
        assert_eq!(repo.storage().persist_calls(), 0);
    }

    #[test]
    fn failed_save_keeps_everything() {
        let mut repo = repo_with(&[(1, "a")]);
        repo.update(&1, row(1, "a2")).unwrap();
        repo.add(2, row(2, "b")).unwrap();
        repo.storage_mut().fail_next_persist();

        assert!(block_on(repo.save()).is_err());
        assert_eq!(repo.state(&1), ChangeState::Modified);
        assert_eq!(repo.state(&2), ChangeState::Added);
        assert_eq!(repo.tracker().baseline(&1), Some(&row(1, "a")));

        let counts = block_on(repo.save()).unwrap();
        assert_eq!(counts.added, 1);
        assert_eq!(counts.modified, 1);
        assert!(!repo.has_changes());
        assert_eq!(repo.storage().get(&1), Some(&row(1, "a2")));
    }

    #[test]
    fn reload_discards_pending_edits() {
        let mut repo = repo_with(&[(1, "a")]);
        repo.update(&1, row(1, "a2")).unwrap();
        block_on(repo.reload()).unwrap();
        assert!(!repo.has_changes());
        assert_eq!(block_on(repo.get(&1)).unwrap().unwrap().label, "a");
    }
}
