use crate::error::TrackingError;
use crate::property_tracker::{PropertyChange, PropertyChangeTracker};
use crate::signal::{HasChangesSignal, SubscriptionId};
use crate::state::{ChangeCounts, ChangeSet, ChangeState};
use recordkit_common::{PropertyAccess, PropertyValue, Record, RecordKey, deep_clone};
use std::collections::{BTreeMap, BTreeSet};

/// Generic change-tracking state machine over a keyed collection.
///
/// Holds a deep-copied baseline per persisted key, a working copy per key
/// being edited, and the added/modified/deleted key sets. Every mutation
/// ends by re-evaluating `has_changes`, so listeners hear about a flip only
/// after the mutation is complete.
#[derive(Debug)]
pub struct ChangeTracker<K: RecordKey, T: Record> {
    baselines: BTreeMap<K, T>,
    working: BTreeMap<K, T>,
    added: BTreeSet<K>,
    modified: BTreeSet<K>,
    deleted: BTreeSet<K>,
    /// Modified keys that stay modified whatever their payload diffs say.
    pinned: BTreeSet<K>,
    properties: PropertyChangeTracker<K>,
    signal: HasChangesSignal,
}

impl<K: RecordKey, T: Record> ChangeTracker<K, T> {
    pub fn new() -> Self {
        Self {
            baselines: BTreeMap::new(),
            working: BTreeMap::new(),
            added: BTreeSet::new(),
            modified: BTreeSet::new(),
            deleted: BTreeSet::new(),
            pinned: BTreeSet::new(),
            properties: PropertyChangeTracker::new(),
            signal: HasChangesSignal::new(),
        }
    }

    /// Record the persisted value of `key`. Tracking sets are untouched.
    pub fn set_baseline(&mut self, key: K, data: &T) {
        self.baselines.insert(key, deep_clone(data));
    }

    pub fn baseline(&self, key: &K) -> Option<&T> {
        self.baselines.get(key)
    }

    pub fn has_baseline(&self, key: &K) -> bool {
        self.baselines.contains_key(key)
    }

    /// Track `data` as a new record.
    ///
    /// Re-adding a key with a pending delete cancels the delete: the key has a
    /// baseline, so it comes back as modified (or unchanged, if `data` equals
    /// the baseline) rather than as a second insert of the same key.
    pub fn mark_added(&mut self, key: K, data: T) {
        if self.baselines.contains_key(&key) {
            tracing::debug!(?key, "re-add of persisted record cancels delete");
            self.deleted.remove(&key);
            self.properties.clear_for_key(&key);
            self.working.insert(key.clone(), data);
            self.sync_modified(&key);
        } else {
            tracing::debug!(?key, "record added");
            self.deleted.remove(&key);
            self.working.insert(key.clone(), data);
            self.added.insert(key);
        }
        self.notify();
    }

    /// Flag a persisted record as modified.
    ///
    /// No-op for added or deleted keys (those states subsume modified) and for
    /// keys without a baseline.
    pub fn mark_modified(&mut self, key: &K) {
        if self.added.contains(key) || self.deleted.contains(key) {
            return;
        }
        if !self.baselines.contains_key(key) {
            return;
        }
        if self.modified.insert(key.clone()) {
            tracing::debug!(?key, "record modified");
        }
        self.notify();
    }

    /// Flag a persisted record as modified and keep it so until it is
    /// reverted, deleted or saved, even if its payload converges with the
    /// baseline. For changes that live outside the record itself.
    pub fn pin_modified(&mut self, key: &K) {
        if self.added.contains(key) || self.deleted.contains(key) {
            return;
        }
        if !self.baselines.contains_key(key) {
            return;
        }
        self.pinned.insert(key.clone());
        if self.modified.insert(key.clone()) {
            tracing::debug!(?key, "record pinned modified");
        }
        self.notify();
    }

    pub fn is_pinned(&self, key: &K) -> bool {
        self.pinned.contains(key)
    }

    /// Flag a record for removal. Returns false if the key is unknown.
    ///
    /// Removing an added record cancels the add outright; it never reaches
    /// storage.
    pub fn mark_deleted(&mut self, key: &K) -> bool {
        let handled = if self.added.remove(key) {
            tracing::debug!(?key, "removal cancels pending add");
            self.working.remove(key);
            self.properties.clear_for_key(key);
            true
        } else if self.baselines.contains_key(key) {
            tracing::debug!(?key, "record deleted");
            self.deleted.insert(key.clone());
            self.modified.remove(key);
            self.pinned.remove(key);
            self.working.remove(key);
            self.properties.clear_for_key(key);
            true
        } else {
            false
        };
        self.notify();
        handled
    }

    pub fn state(&self, key: &K) -> ChangeState {
        debug_assert!(
            !(self.deleted.contains(key) && self.added.contains(key)),
            "key {key:?} is both added and deleted"
        );
        if self.deleted.contains(key) {
            ChangeState::Deleted
        } else if self.added.contains(key) {
            ChangeState::Added
        } else if self.modified.contains(key) {
            ChangeState::Modified
        } else {
            ChangeState::Unchanged
        }
    }

    /// Discard all pending changes of `key`.
    ///
    /// Added records vanish, deleted records come back as a fresh working copy
    /// of their baseline, and modified records fall back to their baseline.
    /// Returns false, changing nothing, for an untracked key.
    pub fn revert(&mut self, key: &K) -> bool {
        let reverted = match self.state(key) {
            ChangeState::Added => {
                self.added.remove(key);
                self.working.remove(key);
                true
            }
            ChangeState::Deleted => {
                self.deleted.remove(key);
                if let Some(baseline) = self.baselines.get(key) {
                    self.working.insert(key.clone(), deep_clone(baseline));
                }
                true
            }
            ChangeState::Modified => {
                self.modified.remove(key);
                self.working.remove(key);
                true
            }
            ChangeState::Unchanged => false,
        };
        self.properties.clear_for_key(key);
        self.pinned.remove(key);
        if reverted {
            tracing::debug!(?key, "record reverted");
        }
        self.notify();
        reverted
    }

    /// Revert every changed key.
    pub fn revert_all(&mut self) {
        for key in self.changed_keys() {
            self.revert(&key);
        }
    }

    /// The editable copy of `key`, created from the baseline on first use.
    ///
    /// Mutating through this reference does not reclassify the key; follow up
    /// with [`mark_modified`](Self::mark_modified), or use
    /// [`edit`](Self::edit) which does both.
    pub fn working_copy(&mut self, key: &K) -> Result<&mut T, TrackingError> {
        if self.deleted.contains(key) {
            return Err(TrackingError::not_found(key));
        }
        if !self.working.contains_key(key) {
            let baseline = self
                .baselines
                .get(key)
                .ok_or_else(|| TrackingError::not_found(key))?;
            self.working.insert(key.clone(), deep_clone(baseline));
        }
        self.working
            .get_mut(key)
            .ok_or_else(|| TrackingError::not_found(key))
    }

    pub fn has_working_copy(&self, key: &K) -> bool {
        self.working.contains_key(key)
    }

    /// Replace the working copy of a persisted or added key wholesale.
    ///
    /// Property records of the old working copy are dropped; they describe
    /// values that no longer exist.
    pub fn replace_working_copy(&mut self, key: &K, data: T) -> Result<(), TrackingError> {
        *self.working_copy(key)? = data;
        self.properties.clear_for_key(key);
        if !self.added.contains(key) {
            self.modified.insert(key.clone());
            tracing::debug!(?key, "record replaced");
        }
        self.notify();
        Ok(())
    }

    /// Mutate the working copy in place, then reclassify the key by comparing
    /// it with its baseline.
    pub fn edit<R>(&mut self, key: &K, f: impl FnOnce(&mut T) -> R) -> Result<R, TrackingError> {
        let out = f(self.working_copy(key)?);
        if !self.added.contains(key) {
            self.sync_modified(key);
        }
        self.notify();
        Ok(out)
    }

    /// Working copy over baseline. `None` for deleted or unknown keys.
    pub fn current(&self, key: &K) -> Option<&T> {
        if self.deleted.contains(key) {
            return None;
        }
        self.working.get(key).or_else(|| self.baselines.get(key))
    }

    /// Keys that exist from the caller's point of view: persisted or added,
    /// minus pending deletes.
    pub fn logical_keys(&self) -> BTreeSet<K> {
        self.baselines
            .keys()
            .filter(|k| !self.deleted.contains(*k))
            .chain(self.added.iter())
            .cloned()
            .collect()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.added.contains(key) || (self.baselines.contains_key(key) && !self.deleted.contains(key))
    }

    /// All added, modified and deleted keys, in key order.
    pub fn changed_keys(&self) -> Vec<K> {
        let mut keys: Vec<K> = self
            .added
            .iter()
            .chain(&self.modified)
            .chain(&self.deleted)
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn change_counts(&self) -> ChangeCounts {
        ChangeCounts {
            added: self.added.len(),
            modified: self.modified.len(),
            deleted: self.deleted.len(),
        }
    }

    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty())
    }

    /// Private copies of every pending change, partitioned by state.
    pub fn change_set(&self) -> ChangeSet<K, T> {
        let added = self
            .added
            .iter()
            .filter_map(|k| self.working.get(k).map(|d| (k.clone(), deep_clone(d))))
            .collect();
        let modified = self
            .modified
            .iter()
            .filter_map(|k| self.current(k).map(|d| (k.clone(), deep_clone(d))))
            .collect();
        let deleted = self.deleted.iter().cloned().collect();
        ChangeSet {
            added,
            modified,
            deleted,
        }
    }

    /// Fold a successful save into a new baseline.
    ///
    /// Added and modified working copies become baselines, deleted baselines
    /// are purged, and every tracking structure is emptied. This is the only
    /// path back to an all-unchanged state that keeps the edits.
    pub fn refresh_baselines_after_save(&mut self) {
        let promoted: Vec<K> = self.added.iter().chain(&self.modified).cloned().collect();
        for key in promoted {
            if let Some(data) = self.working.get(&key) {
                self.baselines.insert(key, deep_clone(data));
            }
        }
        for key in &self.deleted {
            self.baselines.remove(key);
        }
        tracing::debug!(
            added = self.added.len(),
            modified = self.modified.len(),
            deleted = self.deleted.len(),
            "baselines refreshed after save"
        );
        self.working.clear();
        self.added.clear();
        self.modified.clear();
        self.deleted.clear();
        self.pinned.clear();
        self.properties.clear();
        self.notify();
    }

    /// Forget everything, baselines included. Listeners stay subscribed.
    pub fn clear(&mut self) {
        self.baselines.clear();
        self.working.clear();
        self.added.clear();
        self.modified.clear();
        self.deleted.clear();
        self.pinned.clear();
        self.properties.clear();
        self.notify();
    }

    pub fn is_property_modified(&self, key: &K, property: &str) -> bool {
        self.properties.is_property_modified(key, property)
    }

    pub fn modified_properties<'a>(
        &'a self,
        key: &K,
    ) -> impl Iterator<Item = &'a str> + use<'a, K, T> {
        self.properties.modified_properties(key)
    }

    pub fn property_baseline(&self, key: &K, property: &str) -> Option<&PropertyValue> {
        self.properties.property_baseline(key, property)
    }

    pub fn property_change(&self, key: &K, property: &str) -> Option<&PropertyChange> {
        self.properties.property_change(key, property)
    }

    pub fn subscribe(&mut self, listener: impl FnMut(bool) + Send + 'static) -> SubscriptionId {
        self.signal.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.signal.unsubscribe(id)
    }

    /// Bring modified-membership in line with the outstanding diffs of `key`.
    ///
    /// A key stays modified while it is pinned, has property diffs, or its
    /// working copy differs from the baseline as a whole record.
    fn sync_modified(&mut self, key: &K) {
        let Some(baseline) = self.baselines.get(key) else {
            return;
        };
        let diverged = self.pinned.contains(key)
            || self.properties.has_changes_for(key)
            || self.working.get(key).is_some_and(|wc| wc != baseline);
        if diverged {
            self.modified.insert(key.clone());
        } else if self.modified.remove(key) {
            tracing::debug!(?key, "record converged with baseline");
        }
    }

    fn notify(&mut self) {
        let has_changes = self.has_changes();
        self.signal.set(has_changes);
    }
}

impl<K: RecordKey, T: Record + PropertyAccess> ChangeTracker<K, T> {
    /// Write `value` into the working copy of `key` and diff it against the
    /// baseline. Returns whether the property is now modified.
    ///
    /// Added, deleted and baseline-less keys have nothing to diff against and
    /// are left alone.
    pub fn track_property_change(
        &mut self,
        key: &K,
        property: &str,
        value: PropertyValue,
    ) -> Result<bool, TrackingError> {
        if self.added.contains(key) || self.deleted.contains(key) {
            return Ok(false);
        }
        if !self.baselines.contains_key(key) {
            return Ok(false);
        }
        let working = self.working_copy(key)?;
        if !working.try_set(property, value) {
            return Err(TrackingError::property_rejected(key, property));
        }
        let current = working.try_get(property);
        let baseline_value = self.baselines.get(key).and_then(|b| b.try_get(property));
        let modified = self
            .properties
            .track_change(key, property, baseline_value, current);
        tracing::debug!(?key, property, modified, "property tracked");
        self.sync_modified(key);
        self.notify();
        Ok(modified)
    }

    /// Restore one property of `key` to its baseline value.
    ///
    /// When that was the last divergence, the key drops out of modified and
    /// its working copy is discarded. Returns false if the key has no
    /// baseline or no working copy.
    pub fn revert_property(&mut self, key: &K, property: &str) -> bool {
        let Some(baseline) = self.baselines.get(key) else {
            return false;
        };
        let Some(working) = self.working.get_mut(key) else {
            return false;
        };
        if let Some(original) = baseline.try_get(property) {
            if !working.try_set(property, original) {
                tracing::warn!(?key, property, "baseline value could not be restored");
            }
        }
        self.properties.clear_property(key, property);
        let converged = !self.pinned.contains(key)
            && !self.properties.has_changes_for(key)
            && self
                .working
                .get(key)
                .zip(self.baselines.get(key))
                .is_some_and(|(wc, b)| wc == b);
        if converged {
            self.modified.remove(key);
            self.working.remove(key);
        } else {
            self.sync_modified(key);
        }
        tracing::debug!(?key, property, converged, "property reverted");
        self.notify();
        true
    }
}

impl<K: RecordKey, T: Record> Default for ChangeTracker<K, T> {
    fn default() -> Self {
        Self::new()
    }
}
