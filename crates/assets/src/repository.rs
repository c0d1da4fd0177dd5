use crate::error::AssetError;
use crate::storage::AssetStorage;
use crate::summary::{AssetMetadata, AssetSummary, SummaryIndex, name_from_path, normalize_path};
use recordkit_common::{AssetId, PropertyAccess, PropertyValue, Record};
use recordkit_repo::Lookup;
use recordkit_tracking::{
    ChangeCounts, ChangeSet, ChangeState, ChangeTracker, PropertyChange, SubscriptionId,
};
use std::collections::BTreeMap;
use tracing::Instrument;

/// Asset repository configuration.
#[derive(Debug, Clone)]
pub struct AssetConfig {
    /// Name assets after their file stem when no name is given.
    pub derive_name_from_path: bool,
    /// Reject adds and moves that would give two live assets one name.
    pub require_unique_names: bool,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            derive_name_from_path: true,
            require_unique_names: false,
        }
    }
}

/// Editable asset collection backed by an [`AssetStorage`].
///
/// Summaries for every asset are loaded up front and kept resident;
/// payloads are fetched on first access. Path and display name are
/// summary-level state: moving an asset marks it modified without touching
/// its payload.
pub struct AssetRepository<T: Record, S> {
    tracker: ChangeTracker<AssetId, T>,
    index: SummaryIndex,
    /// Summaries of pending deletes, restored on revert.
    removed: BTreeMap<AssetId, AssetSummary>,
    /// Pre-move summaries of moved persisted assets, restored on revert.
    relocated: BTreeMap<AssetId, AssetSummary>,
    storage: S,
    config: AssetConfig,
    initialized: bool,
}

impl<T, S> AssetRepository<T, S>
where
    T: Record,
    S: AssetStorage<T>,
{
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, AssetConfig::default())
    }

    pub fn with_config(storage: S, config: AssetConfig) -> Self {
        Self {
            tracker: ChangeTracker::new(),
            index: SummaryIndex::new(),
            removed: BTreeMap::new(),
            relocated: BTreeMap::new(),
            storage,
            config,
            initialized: false,
        }
    }

    /// Load every summary. Payloads stay in storage until asked for.
    pub async fn initialize(&mut self) -> Result<(), AssetError> {
        if self.initialized {
            return Ok(());
        }
        self.load_summaries()
            .instrument(tracing::info_span!("asset_initialize"))
            .await
    }

    /// Discard all pending edits and reload summaries.
    pub async fn reload(&mut self) -> Result<(), AssetError> {
        self.initialized = false;
        self.initialize().await
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    async fn load_summaries(&mut self) -> Result<(), AssetError> {
        self.tracker.clear();
        self.index.clear();
        self.removed.clear();
        self.relocated.clear();
        let summaries = match self.storage.enumerate_summaries().await {
            Ok(summaries) => summaries,
            Err(e) => {
                tracing::warn!(error = %e, "asset enumeration failed");
                return Err(e.into());
            }
        };
        let count = summaries.len();
        for summary in summaries {
            self.index.insert(summary);
        }
        self.initialized = true;
        tracing::info!(assets = count, "asset summaries loaded");
        Ok(())
    }

    /// The payload of `id`, or `None` if it is unknown or pending deletion.
    pub async fn get(&mut self, id: AssetId) -> Result<Option<&T>, AssetError> {
        self.initialize().await?;
        self.ensure_loaded(id).await?;
        Ok(self.tracker.current(&id))
    }

    /// Make sure a live asset has a baseline. Returns false if `id` is not
    /// live or storage no longer has its payload.
    async fn ensure_loaded(&mut self, id: AssetId) -> Result<bool, AssetError> {
        if self.tracker.contains(&id) {
            return Ok(true);
        }
        if !self.index.contains(id) {
            return Ok(false);
        }
        match self.storage.load_one(id).await? {
            Lookup::Found(data) => {
                tracing::debug!(%id, "lazily loaded asset");
                self.tracker.set_baseline(id, &data);
                Ok(true)
            }
            Lookup::NotFound => {
                tracing::warn!(%id, "summary has no stored payload");
                Ok(false)
            }
        }
    }

    async fn require_loaded(&mut self, id: AssetId) -> Result<(), AssetError> {
        self.initialize().await?;
        if self.ensure_loaded(id).await? {
            Ok(())
        } else {
            Err(AssetError::NotFound(id))
        }
    }

    /// Track a new asset at `path` and return its id.
    ///
    /// The summary and indices are updated immediately, so the asset can be
    /// found by path or name before it is saved.
    pub fn add(
        &mut self,
        data: T,
        metadata: AssetMetadata,
        path: &str,
    ) -> Result<AssetId, AssetError> {
        self.ensure_initialized()?;
        let id = match metadata.id {
            Some(id) => id.validate()?,
            None => AssetId::new(),
        };
        if self.index.contains(id) || self.tracker.contains(&id) || self.removed.contains_key(&id)
        {
            return Err(AssetError::DuplicateId(id));
        }
        let path = self.check_path(id, path)?;
        let name = match metadata.name {
            Some(name) => name,
            None => self.default_name(&path),
        };
        self.check_name(id, &name)?;

        self.tracker.mark_added(id, data);
        tracing::debug!(%id, %path, "asset added");
        self.index.insert(AssetSummary::new(id, path, name));
        Ok(id)
    }

    /// Replace the payload of a live asset.
    pub async fn update(&mut self, id: AssetId, data: T) -> Result<(), AssetError> {
        self.require_loaded(id).await?;
        self.tracker
            .replace_working_copy(&id, data)
            .map_err(|e| AssetError::from_tracking(id, e))?;
        Ok(())
    }

    /// Mutate the payload of a live asset in place.
    pub async fn edit<R>(
        &mut self,
        id: AssetId,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, AssetError> {
        self.require_loaded(id).await?;
        self.tracker
            .edit(&id, f)
            .map_err(|e| AssetError::from_tracking(id, e))
    }

    /// Give a live asset a new path. A name derived from the old path follows
    /// the move; an explicit one is kept.
    pub async fn move_to(&mut self, id: AssetId, new_path: &str) -> Result<(), AssetError> {
        self.require_loaded(id).await?;
        let current = self.index.get(id).cloned().ok_or(AssetError::NotFound(id))?;
        let path = self.check_path(id, new_path)?;
        if path == current.path {
            return Ok(());
        }
        let name = if self.config.derive_name_from_path && current.name == name_from_path(&current.path)
        {
            name_from_path(&path)
        } else {
            current.name.clone()
        };
        self.check_name(id, &name)?;

        tracing::debug!(%id, from = %current.path, to = %path, "asset moved");
        let moved = AssetSummary {
            path,
            name,
            ..current.clone()
        };
        if self.tracker.state(&id) != ChangeState::Added {
            self.relocated.entry(id).or_insert(current);
            self.tracker.pin_modified(&id);
        }
        self.index.insert(moved);
        Ok(())
    }

    /// Mark a live asset for deletion. Its summary leaves the indices at once.
    ///
    /// Returns false if the asset was not live. Removing an unsaved asset
    /// forgets it entirely.
    pub async fn remove(&mut self, id: AssetId) -> Result<bool, AssetError> {
        self.initialize().await?;
        if !self.ensure_loaded(id).await? {
            return Ok(false);
        }
        let added = self.tracker.state(&id) == ChangeState::Added;
        let summary = self.index.remove(id);
        self.tracker.mark_deleted(&id);
        if !added {
            if let Some(summary) = summary {
                self.removed.insert(id, summary);
            }
        }
        tracing::debug!(%id, added, "asset removed");
        Ok(true)
    }

    /// Undo every pending change to `id`, summary included. Returns false if
    /// there was nothing to undo.
    pub fn revert(&mut self, id: AssetId) -> bool {
        let moved = self.relocated.remove(&id);
        match self.tracker.state(&id) {
            ChangeState::Added => {
                self.index.remove(id);
                self.tracker.revert(&id)
            }
            ChangeState::Deleted => {
                let removed = self.removed.remove(&id);
                if let Some(summary) = moved.or(removed) {
                    self.index.insert(summary);
                }
                self.tracker.revert(&id)
            }
            ChangeState::Modified => {
                if let Some(summary) = moved {
                    self.index.insert(summary);
                }
                self.tracker.revert(&id)
            }
            ChangeState::Unchanged => false,
        }
    }

    pub fn revert_all(&mut self) {
        for id in self.tracker.changed_keys() {
            self.revert(id);
        }
    }

    /// Persist every pending change, one asset at a time.
    ///
    /// Summaries are refreshed from what storage reports, but only once every
    /// write has succeeded. On failure nothing is promoted, and a retry
    /// rewrites the whole set.
    pub async fn save(&mut self) -> Result<ChangeCounts, AssetError> {
        let changes = self.tracker.change_set();
        let counts = changes.counts();
        if changes.is_empty() {
            tracing::debug!("save skipped, nothing to persist");
            return Ok(counts);
        }
        let span = tracing::info_span!(
            "asset_save",
            added = counts.added,
            modified = counts.modified,
            deleted = counts.deleted
        );
        let refreshed = match self.write_changes(&changes).instrument(span).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                tracing::warn!(error = %e, "asset save failed, changes kept");
                return Err(e);
            }
        };
        self.tracker.refresh_baselines_after_save();
        for summary in refreshed {
            self.index.insert(summary);
        }
        self.removed.clear();
        self.relocated.clear();
        tracing::info!(%counts, "assets saved");
        Ok(counts)
    }

    async fn write_changes(
        &mut self,
        changes: &ChangeSet<AssetId, T>,
    ) -> Result<Vec<AssetSummary>, AssetError> {
        let mut refreshed = Vec::with_capacity(changes.added.len() + changes.modified.len());
        for (id, data) in changes.added.iter().chain(&changes.modified) {
            let summary = self.index.get(*id).cloned().ok_or_else(|| {
                AssetError::InvalidState(format!("asset {id} has no summary"))
            })?;
            refreshed.push(self.storage.persist_one(data, &summary).await?);
        }
        for id in &changes.deleted {
            self.storage.delete_one(*id).await?;
        }
        Ok(refreshed)
    }

    pub fn summary(&self, id: AssetId) -> Option<&AssetSummary> {
        self.index.get(id)
    }

    /// Summaries of every live asset, in id order.
    pub fn summaries(&self) -> impl Iterator<Item = &AssetSummary> {
        self.index.iter()
    }

    pub fn find_by_path(&self, path: &str) -> Option<&AssetSummary> {
        self.index
            .id_for_path(&normalize_path(path))
            .and_then(|id| self.index.get(id))
    }

    pub fn find_by_name(&self, name: &str) -> Vec<&AssetSummary> {
        self.index
            .ids_for_name(name)
            .filter_map(|id| self.index.get(id))
            .collect()
    }

    pub fn contains(&self, id: AssetId) -> bool {
        self.index.contains(id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Whether the payload of `id` is resident.
    pub fn is_loaded(&self, id: AssetId) -> bool {
        self.tracker.current(&id).is_some()
    }

    pub fn state(&self, id: AssetId) -> ChangeState {
        self.tracker.state(&id)
    }

    pub fn has_changes(&self) -> bool {
        self.tracker.has_changes()
    }

    pub fn change_counts(&self) -> ChangeCounts {
        self.tracker.change_counts()
    }

    pub fn changed_ids(&self) -> Vec<AssetId> {
        self.tracker.changed_keys()
    }

    pub fn is_property_modified(&self, id: AssetId, property: &str) -> bool {
        self.tracker.is_property_modified(&id, property)
    }

    pub fn modified_properties(&self, id: AssetId) -> Vec<&str> {
        self.tracker.modified_properties(&id).collect()
    }

    pub fn property_baseline(&self, id: AssetId, property: &str) -> Option<&PropertyValue> {
        self.tracker.property_baseline(&id, property)
    }

    pub fn property_change(&self, id: AssetId, property: &str) -> Option<&PropertyChange> {
        self.tracker.property_change(&id, property)
    }

    /// Listen for has-changes transitions.
    pub fn subscribe(&mut self, listener: impl FnMut(bool) + Send + 'static) -> SubscriptionId {
        self.tracker.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.tracker.unsubscribe(id)
    }

    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    fn ensure_initialized(&self) -> Result<(), AssetError> {
        if self.initialized {
            Ok(())
        } else {
            Err(AssetError::InvalidState("asset repository not initialized".into()))
        }
    }

    fn default_name(&self, path: &str) -> String {
        if self.config.derive_name_from_path {
            name_from_path(path)
        } else {
            path.to_string()
        }
    }

    /// Normalize `path` and make sure no other asset holds it, including
    /// assets whose pending delete or move could still be reverted.
    fn check_path(&self, id: AssetId, path: &str) -> Result<String, AssetError> {
        let path = normalize_path(path);
        if path.is_empty() {
            return Err(AssetError::InvalidPath(path));
        }
        let taken = self.index.id_for_path(&path).is_some_and(|other| other != id)
            || self.removed.values().any(|s| s.path == path)
            || self
                .relocated
                .iter()
                .any(|(other, s)| *other != id && s.path == path);
        if taken {
            return Err(AssetError::DuplicatePath(path));
        }
        Ok(path)
    }

    fn check_name(&self, id: AssetId, name: &str) -> Result<(), AssetError> {
        if !self.config.require_unique_names {
            return Ok(());
        }
        let taken = self.index.ids_for_name(name).any(|other| other != id)
            || self.removed.values().any(|s| s.name == name)
            || self
                .relocated
                .iter()
                .any(|(other, s)| *other != id && s.name == name);
        if taken {
            return Err(AssetError::DuplicateName(name.to_string()));
        }
        Ok(())
    }
}

impl<T, S> AssetRepository<T, S>
where
    T: Record + PropertyAccess,
    S: AssetStorage<T>,
{
    /// Set one property of a live asset's payload. Returns whether it now
    /// differs from the baseline; always false for unsaved assets.
    pub async fn set_property(
        &mut self,
        id: AssetId,
        property: &str,
        value: PropertyValue,
    ) -> Result<bool, AssetError> {
        self.require_loaded(id).await?;
        if self.tracker.state(&id) == ChangeState::Added {
            let written = self
                .tracker
                .edit(&id, |asset| asset.try_set(property, value))
                .map_err(|e| AssetError::from_tracking(id, e))?;
            if !written {
                return Err(AssetError::PropertyRejected {
                    id,
                    property: property.to_string(),
                });
            }
            return Ok(false);
        }
        self.tracker
            .track_property_change(&id, property, value)
            .map_err(|e| AssetError::from_tracking(id, e))
    }

    pub fn revert_property(&mut self, id: AssetId, property: &str) -> bool {
        self.tracker.revert_property(&id, property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryAssetStorage;
    use pollster::block_on;
    use recordkit_common::SerdeProperties;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Texture {
        width: u32,
        height: u32,
    }

    impl SerdeProperties for Texture {}

    fn texture(width: u32, height: u32) -> Texture {
        Texture { width, height }
    }

    type Repo = AssetRepository<Texture, MemoryAssetStorage<Texture>>;

    fn seeded(paths: &[&str]) -> (Repo, Vec<AssetId>) {
        let mut storage = MemoryAssetStorage::new();
        let mut ids = Vec::new();
        for path in paths {
            let id = AssetId::new();
            storage
                .insert(AssetSummary::new(id, *path, name_from_path(path)), texture(8, 8))
                .unwrap();
            ids.push(id);
        }
        let mut repo = AssetRepository::new(storage);
        block_on(repo.initialize()).unwrap();
        (repo, ids)
    }

    #[test]
    fn initialize_loads_summaries_only() {
        let (mut repo, ids) = seeded(&["tex/grass.png", "tex/rock.png"]);
        assert_eq!(repo.len(), 2);
        assert!(!repo.is_loaded(ids[0]));

        assert_eq!(block_on(repo.get(ids[0])).unwrap(), Some(&texture(8, 8)));
        assert!(repo.is_loaded(ids[0]));
        assert!(!repo.is_loaded(ids[1]));
    }

    #[test]
    fn add_is_findable_by_path_and_name_at_once() {
        let (mut repo, _) = seeded(&[]);
        let id = repo
            .add(texture(4, 4), AssetMetadata::default(), "./tex\\water.png")
            .unwrap();

        let summary = repo.find_by_path("tex/water.png").unwrap();
        assert_eq!(summary.id, id);
        assert_eq!(summary.name, "water");
        assert_eq!(summary.content_hash, None);
        assert_eq!(repo.find_by_name("water").len(), 1);
        assert_eq!(repo.state(id), ChangeState::Added);
    }

    #[test]
    fn add_honours_supplied_id_and_name() {
        let (mut repo, _) = seeded(&[]);
        let wanted = AssetId::new();
        let meta = AssetMetadata {
            id: Some(wanted),
            name: Some("Sky".into()),
        };
        assert_eq!(repo.add(texture(1, 1), meta, "sky.png").unwrap(), wanted);
        assert_eq!(repo.summary(wanted).map(|s| s.name.as_str()), Some("Sky"));
    }

    #[test]
    fn add_rejects_bad_ids_and_paths() {
        let (mut repo, ids) = seeded(&["a.png"]);

        let nil = repo.add(texture(1, 1), AssetMetadata::with_id(AssetId::nil()), "b.png");
        assert!(matches!(nil, Err(AssetError::InvalidId(_))));

        let dup = repo.add(texture(1, 1), AssetMetadata::with_id(ids[0]), "c.png");
        assert!(matches!(dup, Err(AssetError::DuplicateId(id)) if id == ids[0]));

        let taken = repo.add(texture(1, 1), AssetMetadata::default(), "a.png");
        assert!(matches!(taken, Err(AssetError::DuplicatePath(p)) if p == "a.png"));

        let empty = repo.add(texture(1, 1), AssetMetadata::default(), "  ");
        assert!(matches!(empty, Err(AssetError::InvalidPath(_))));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn unique_names_when_configured() {
        let config = AssetConfig {
            require_unique_names: true,
            ..AssetConfig::default()
        };
        let mut repo = AssetRepository::with_config(MemoryAssetStorage::new(), config);
        block_on(repo.initialize()).unwrap();
        repo.add(texture(1, 1), AssetMetadata::default(), "a/tree.png")
            .unwrap();
        let err = repo
            .add(texture(1, 1), AssetMetadata::default(), "b/tree.png")
            .unwrap_err();
        assert!(matches!(err, AssetError::DuplicateName(n) if n == "tree"));
    }

    #[test]
    fn add_before_initialize_fails() {
        let mut repo: Repo = AssetRepository::new(MemoryAssetStorage::new());
        let err = repo
            .add(texture(1, 1), AssetMetadata::default(), "a.png")
            .unwrap_err();
        assert!(matches!(err, AssetError::InvalidState(_)));
    }

    #[test]
    fn remove_then_revert_restores_indices() {
        let (mut repo, ids) = seeded(&["tex/grass.png"]);
        let id = ids[0];

        assert!(block_on(repo.remove(id)).unwrap());
        assert!(repo.find_by_path("tex/grass.png").is_none());
        assert!(repo.find_by_name("grass").is_empty());
        assert_eq!(repo.state(id), ChangeState::Deleted);
        assert_eq!(block_on(repo.get(id)).unwrap(), None);

        assert!(repo.revert(id));
        assert_eq!(repo.find_by_path("tex/grass.png").map(|s| s.id), Some(id));
        assert_eq!(repo.state(id), ChangeState::Unchanged);
        assert_eq!(block_on(repo.get(id)).unwrap(), Some(&texture(8, 8)));
    }

    #[test]
    fn removing_unsaved_asset_forgets_it() {
        let (mut repo, _) = seeded(&[]);
        let id = repo
            .add(texture(2, 2), AssetMetadata::default(), "tmp.png")
            .unwrap();
        assert!(block_on(repo.remove(id)).unwrap());

        assert!(!repo.contains(id));
        assert!(!repo.has_changes());
        assert_eq!(repo.state(id), ChangeState::Unchanged);
        assert!(!repo.revert(id));
    }

    #[test]
    fn path_of_pending_delete_stays_reserved() {
        let (mut repo, ids) = seeded(&["a.png"]);
        block_on(repo.remove(ids[0])).unwrap();
        let err = repo
            .add(texture(1, 1), AssetMetadata::default(), "a.png")
            .unwrap_err();
        assert!(matches!(err, AssetError::DuplicatePath(_)));
    }

    #[test]
    fn revert_of_add_drops_summary() {
        let (mut repo, _) = seeded(&[]);
        let id = repo
            .add(texture(2, 2), AssetMetadata::default(), "new.png")
            .unwrap();
        assert!(repo.revert(id));
        assert!(repo.find_by_path("new.png").is_none());
        assert!(repo.is_empty());
    }

    #[test]
    fn property_edits_diff_against_baseline() {
        let (mut repo, ids) = seeded(&["a.png"]);
        let id = ids[0];

        assert!(block_on(repo.set_property(id, "width", json!(16))).unwrap());
        assert_eq!(repo.state(id), ChangeState::Modified);
        assert_eq!(repo.modified_properties(id), vec!["width"]);

        assert!(!block_on(repo.set_property(id, "width", json!(8))).unwrap());
        assert_eq!(repo.state(id), ChangeState::Unchanged);
    }

    #[test]
    fn move_reindexes_and_marks_modified() {
        let (mut repo, ids) = seeded(&["tex/grass.png", "tex/rock.png"]);
        let id = ids[0];

        block_on(repo.move_to(id, "terrain/grass_v2.png")).unwrap();
        assert!(repo.find_by_path("tex/grass.png").is_none());
        assert_eq!(repo.find_by_path("terrain/grass_v2.png").map(|s| s.id), Some(id));
        assert_eq!(repo.summary(id).map(|s| s.name.as_str()), Some("grass_v2"));
        assert_eq!(repo.state(id), ChangeState::Modified);

        let clash = block_on(repo.move_to(ids[1], "tex/grass.png")).unwrap_err();
        assert!(matches!(clash, AssetError::DuplicatePath(_)));

        // An edit that converges with the baseline must not hide the move.
        block_on(repo.set_property(id, "width", json!(9))).unwrap();
        block_on(repo.set_property(id, "width", json!(8))).unwrap();
        assert_eq!(repo.state(id), ChangeState::Modified);

        assert!(repo.revert(id));
        assert_eq!(repo.find_by_path("tex/grass.png").map(|s| s.id), Some(id));
        assert!(repo.find_by_path("terrain/grass_v2.png").is_none());
        assert!(!repo.has_changes());
    }

    #[test]
    fn edits_after_move_notify_once() {
        let (mut repo, ids) = seeded(&["a.png"]);
        let id = ids[0];
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        repo.subscribe(move |v| sink.lock().unwrap().push(v));

        block_on(repo.move_to(id, "b.png")).unwrap();
        block_on(repo.set_property(id, "width", json!(9))).unwrap();
        block_on(repo.set_property(id, "width", json!(8))).unwrap();
        block_on(repo.set_property(id, "height", json!(3))).unwrap();
        assert!(repo.revert_property(id, "height"));
        block_on(repo.edit(id, |t| t.width = 8)).unwrap();
        assert_eq!(repo.state(id), ChangeState::Modified);
        assert_eq!(*seen.lock().unwrap(), vec![true]);

        block_on(repo.save()).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
        assert_eq!(repo.storage().summary(id).map(|s| s.path.as_str()), Some("b.png"));
    }

    #[test]
    fn update_drops_stale_property_records() {
        let (mut repo, ids) = seeded(&["a.png"]);
        let id = ids[0];
        block_on(repo.set_property(id, "width", json!(2))).unwrap();
        block_on(repo.update(id, texture(8, 7))).unwrap();
        assert!(!repo.is_property_modified(id, "width"));
        assert_eq!(repo.state(id), ChangeState::Modified);
    }

    #[test]
    fn save_refreshes_summaries_and_baselines() {
        let (mut repo, ids) = seeded(&["old.png", "gone.png"]);
        let added = repo
            .add(texture(32, 32), AssetMetadata::default(), "fresh.png")
            .unwrap();
        block_on(repo.update(ids[0], texture(64, 64))).unwrap();
        block_on(repo.remove(ids[1])).unwrap();

        let counts = block_on(repo.save()).unwrap();
        assert_eq!((counts.added, counts.modified, counts.deleted), (1, 1, 1));
        assert!(!repo.has_changes());

        let summary = repo.summary(added).unwrap();
        assert!(summary.content_hash.is_some());
        assert!(summary.modified_at.is_some());
        assert_eq!(repo.storage().summary(added), Some(summary));
        assert_eq!(repo.storage().get(ids[0]), Some(&texture(64, 64)));
        assert!(repo.storage().get(ids[1]).is_none());
        assert_eq!(repo.storage().delete_calls(), 1);
        assert_eq!(block_on(repo.get(added)).unwrap(), Some(&texture(32, 32)));
    }

    #[test]
    fn failed_save_keeps_everything_pending() {
        let (mut repo, ids) = seeded(&["a.png", "b.png"]);
        let added = repo
            .add(texture(1, 1), AssetMetadata::default(), "c.png")
            .unwrap();
        block_on(repo.update(ids[0], texture(2, 2))).unwrap();
        block_on(repo.remove(ids[1])).unwrap();
        repo.storage_mut().fail_persist_after(1);

        assert!(matches!(block_on(repo.save()), Err(AssetError::Storage(_))));
        assert_eq!(repo.state(added), ChangeState::Added);
        assert_eq!(repo.state(ids[0]), ChangeState::Modified);
        assert_eq!(repo.state(ids[1]), ChangeState::Deleted);
        assert_eq!(repo.summary(added).and_then(|s| s.content_hash.as_ref()), None);
        assert!(repo.storage().get(ids[1]).is_some());

        block_on(repo.save()).unwrap();
        assert!(!repo.has_changes());
        assert_eq!(repo.len(), 2);
        assert!(repo.storage().get(ids[1]).is_none());
    }

    #[test]
    fn stale_summary_reads_as_absent() {
        let (mut repo, ids) = seeded(&["a.png"]);
        block_on(repo.storage_mut().delete_one(ids[0])).unwrap();
        assert_eq!(block_on(repo.get(ids[0])).unwrap(), None);
        assert!(matches!(
            block_on(repo.update(ids[0], texture(1, 1))),
            Err(AssetError::NotFound(_))
        ));
    }

    #[test]
    fn lazy_load_errors_propagate() {
        let (mut repo, ids) = seeded(&["a.png"]);
        repo.storage_mut().set_fail_reads(true);
        assert!(matches!(block_on(repo.get(ids[0])), Err(AssetError::Storage(_))));
    }

    #[test]
    fn failed_enumeration_leaves_repository_uninitialized() {
        let mut storage = MemoryAssetStorage::<Texture>::new();
        storage.set_fail_reads(true);
        let mut repo = AssetRepository::new(storage);
        assert!(block_on(repo.initialize()).is_err());
        assert!(!repo.is_initialized());
    }

    #[test]
    fn notifications_follow_has_changes() {
        let (mut repo, ids) = seeded(&["a.png"]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        repo.subscribe(move |v| sink.lock().unwrap().push(v));

        block_on(repo.remove(ids[0])).unwrap();
        repo.revert_all();
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }
}
