use recordkit_common::{PropertyValue, RecordKey, values_equal};
use std::collections::BTreeMap;

/// A property whose current value differs from its baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    /// Value at first divergence. `None` if the baseline lacked the property.
    pub baseline: Option<PropertyValue>,
    pub current: Option<PropertyValue>,
}

/// Per-(key, property) diff store.
///
/// A record exists only while its two values differ; tracking a value equal
/// to the baseline removes it.
#[derive(Debug, Clone)]
pub struct PropertyChangeTracker<K: RecordKey> {
    changes: BTreeMap<K, BTreeMap<String, PropertyChange>>,
}

impl<K: RecordKey> PropertyChangeTracker<K> {
    pub fn new() -> Self {
        Self {
            changes: BTreeMap::new(),
        }
    }

    /// Record `new_value` for `property`. Returns whether it is now modified.
    ///
    /// The stored baseline is fixed on first divergence; later calls only move
    /// the current value.
    pub fn track_change(
        &mut self,
        key: &K,
        property: &str,
        baseline_value: Option<PropertyValue>,
        new_value: Option<PropertyValue>,
    ) -> bool {
        if values_equal(baseline_value.as_ref(), new_value.as_ref()) {
            self.clear_property(key, property);
            return false;
        }
        let props = self.changes.entry(key.clone()).or_default();
        match props.get_mut(property) {
            Some(existing) => existing.current = new_value,
            None => {
                props.insert(
                    property.to_string(),
                    PropertyChange {
                        baseline: baseline_value,
                        current: new_value,
                    },
                );
            }
        }
        true
    }

    pub fn is_property_modified(&self, key: &K, property: &str) -> bool {
        self.changes
            .get(key)
            .is_some_and(|props| props.contains_key(property))
    }

    /// Names of the modified properties of `key`.
    pub fn modified_properties<'a>(
        &'a self,
        key: &K,
    ) -> impl Iterator<Item = &'a str> + use<'a, K> {
        self.changes
            .get(key)
            .into_iter()
            .flat_map(|props| props.keys().map(String::as_str))
    }

    /// Baseline value of a modified property, if it had one.
    pub fn property_baseline(&self, key: &K, property: &str) -> Option<&PropertyValue> {
        self.property_change(key, property)?.baseline.as_ref()
    }

    pub fn property_change(&self, key: &K, property: &str) -> Option<&PropertyChange> {
        self.changes.get(key)?.get(property)
    }

    pub fn has_changes_for(&self, key: &K) -> bool {
        self.changes.contains_key(key)
    }

    /// Keys with at least one modified property.
    pub fn tracked_keys(&self) -> impl Iterator<Item = &K> {
        self.changes.keys()
    }

    /// Drop one property record. Returns whether it existed.
    pub fn clear_property(&mut self, key: &K, property: &str) -> bool {
        let Some(props) = self.changes.get_mut(key) else {
            return false;
        };
        let removed = props.remove(property).is_some();
        if props.is_empty() {
            self.changes.remove(key);
        }
        removed
    }

    pub fn clear_for_key(&mut self, key: &K) {
        self.changes.remove(key);
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Total number of modified properties across all keys.
    pub fn change_count(&self) -> usize {
        self.changes.values().map(BTreeMap::len).sum()
    }
}

impl<K: RecordKey> Default for PropertyChangeTracker<K> {
    fn default() -> Self {
        Self::new()
    }
}
