use crate::error::RepositoryError;
use crate::storage::SingleStorage;
use recordkit_common::{PropertyAccess, PropertyValue, Record, deep_clone, deep_equals_opt};
use recordkit_tracking::{HasChangesSignal, PropertyChange, PropertyChangeTracker, SubscriptionId};
use std::collections::BTreeSet;
use tracing::Instrument;

/// Editable repository holding at most one record.
///
/// Tracks a baseline, the current record and per-property diffs between the
/// two. `is_modified` is whole-record inequality, so reassigning the original
/// value undoes an edit.
pub struct SingleRepository<T: Record, S> {
    baseline: Option<T>,
    current: Option<T>,
    is_modified: bool,
    properties: PropertyChangeTracker<()>,
    signal: HasChangesSignal,
    storage: S,
}

impl<T, S> SingleRepository<T, S>
where
    T: Record + PropertyAccess,
    S: SingleStorage<T>,
{
    pub fn new(storage: S) -> Self {
        Self {
            baseline: None,
            current: None,
            is_modified: false,
            properties: PropertyChangeTracker::new(),
            signal: HasChangesSignal::new(),
            storage,
        }
    }

    /// Load the stored record as both baseline and current value.
    pub async fn load(&mut self) -> Result<&T, RepositoryError> {
        let record = self
            .storage
            .load()
            .instrument(tracing::info_span!("single_load"))
            .await?;
        self.baseline = Some(deep_clone(&record));
        self.properties.clear();
        self.is_modified = false;
        tracing::info!("single record loaded");
        self.signal.set(false);
        Ok(self.current.insert(record))
    }

    pub fn is_loaded(&self) -> bool {
        self.current.is_some()
    }

    pub fn get(&self) -> Option<&T> {
        self.current.as_ref()
    }

    pub fn baseline(&self) -> Option<&T> {
        self.baseline.as_ref()
    }

    pub fn is_modified(&self) -> bool {
        self.is_modified
    }

    pub fn has_changes(&self) -> bool {
        self.is_modified
    }

    /// Replace the current record wholesale.
    pub fn set(&mut self, data: T) {
        self.current = Some(data);
        self.rediff_all();
        self.refresh_modified();
    }

    /// Mutate the current record in place.
    pub fn edit<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> Result<R, RepositoryError> {
        let current = self.current.as_mut().ok_or_else(not_loaded)?;
        let out = f(current);
        self.rediff_all();
        self.refresh_modified();
        Ok(out)
    }

    /// Write one property of the current record and diff it against the
    /// baseline. Returns whether the property now differs.
    pub fn track_property_change(
        &mut self,
        property: &str,
        value: PropertyValue,
    ) -> Result<bool, RepositoryError> {
        let current = self.current.as_mut().ok_or_else(not_loaded)?;
        if !current.try_set(property, value) {
            return Err(RepositoryError::PropertyRejected {
                key: "()".into(),
                property: property.to_string(),
            });
        }
        let modified = self.rediff(property);
        tracing::debug!(property, modified, "property tracked");
        self.refresh_modified();
        Ok(modified)
    }

    /// Restore one property to its baseline value. Returns false if there is
    /// no baseline or current record.
    pub fn revert_property(&mut self, property: &str) -> bool {
        let (Some(baseline), Some(current)) = (self.baseline.as_ref(), self.current.as_mut()) else {
            return false;
        };
        if let Some(original) = baseline.try_get(property) {
            if !current.try_set(property, original) {
                tracing::warn!(property, "baseline value could not be restored");
            }
        }
        self.properties.clear_property(&(), property);
        self.refresh_modified();
        true
    }

    /// Throw away every edit.
    pub fn revert(&mut self) {
        self.current = self.baseline.as_ref().map(deep_clone);
        self.properties.clear();
        self.refresh_modified();
    }

    pub fn is_property_modified(&self, property: &str) -> bool {
        self.properties.is_property_modified(&(), property)
    }

    pub fn modified_properties(&self) -> Vec<&str> {
        self.properties.modified_properties(&()).collect()
    }

    pub fn property_baseline(&self, property: &str) -> Option<&PropertyValue> {
        self.properties.property_baseline(&(), property)
    }

    pub fn property_change(&self, property: &str) -> Option<&PropertyChange> {
        self.properties.property_change(&(), property)
    }

    /// Persist the current record and make it the new baseline.
    pub async fn save(&mut self) -> Result<(), RepositoryError> {
        let current = self
            .current
            .as_ref()
            .ok_or_else(|| RepositoryError::InvalidState("no record to save".into()))?;
        if let Err(e) = self
            .storage
            .persist(current)
            .instrument(tracing::info_span!("single_save"))
            .await
        {
            tracing::warn!(error = %e, "save failed, changes kept");
            return Err(e.into());
        }
        self.baseline = Some(deep_clone(current));
        self.properties.clear();
        self.is_modified = false;
        tracing::info!("single record saved");
        self.signal.set(false);
        Ok(())
    }

    /// Adopt a baseline that changed outside this repository.
    ///
    /// Without local edits the new value simply replaces both baseline and
    /// current. With local edits only the baseline moves: current keeps every
    /// value the caller holds, and each tracked property is re-diffed against
    /// the new baseline. An edit that now matches it stops counting as a
    /// change; every other edit survives.
    pub fn refresh_baseline(&mut self, new_baseline: T) {
        if !self.is_modified {
            tracing::debug!("baseline refreshed, no local edits");
            self.current = Some(deep_clone(&new_baseline));
            self.baseline = Some(new_baseline);
            self.properties.clear();
            self.refresh_modified();
            return;
        }
        self.baseline = Some(new_baseline);
        let edited: Vec<String> = self
            .properties
            .modified_properties(&())
            .map(str::to_string)
            .collect();
        self.properties.clear();
        for name in &edited {
            self.rediff(name);
        }
        tracing::debug!(
            kept = self.properties.change_count(),
            "baseline refreshed under local edits"
        );
        self.refresh_modified();
    }

    pub fn subscribe(&mut self, listener: impl FnMut(bool) + Send + 'static) -> SubscriptionId {
        self.signal.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.signal.unsubscribe(id)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Diff one property of current against baseline.
    fn rediff(&mut self, property: &str) -> bool {
        let baseline_value = self.baseline.as_ref().and_then(|b| b.try_get(property));
        let current_value = self.current.as_ref().and_then(|c| c.try_get(property));
        self.properties
            .track_change(&(), property, baseline_value, current_value)
    }

    /// Diff every top-level property of current against baseline.
    fn rediff_all(&mut self) {
        let names: BTreeSet<String> = self
            .baseline
            .iter()
            .chain(self.current.iter())
            .flat_map(|record| record.property_names())
            .collect();
        let tracked: Vec<String> = self
            .properties
            .modified_properties(&())
            .map(str::to_string)
            .collect();
        for name in tracked.iter().chain(&names) {
            self.rediff(name);
        }
    }

    fn refresh_modified(&mut self) {
        self.is_modified = !deep_equals_opt(self.baseline.as_ref(), self.current.as_ref());
        self.signal.set(self.is_modified);
    }
}

fn not_loaded() -> RepositoryError {
    RepositoryError::InvalidState("no record loaded".into())
}
