//! Runtime property access by name.
//!
//! This is the one dynamic seam in the engine: per-property diffing needs to
//! read and write a named field of an otherwise opaque record. Names may be
//! dotted paths (`"stats.hp"`) into nested objects.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Dynamic value of a single property.
pub type PropertyValue = Value;

/// Read and write named properties of a record.
///
/// Implementations never panic: a missing property reads as `None`, and a
/// write to a missing or read-only property returns `false` and leaves the
/// record untouched.
pub trait PropertyAccess {
    fn try_get(&self, name: &str) -> Option<PropertyValue>;

    fn try_set(&mut self, name: &str, value: PropertyValue) -> bool;

    /// Top-level property names, in no particular order.
    fn property_names(&self) -> Vec<String>;
}

/// Opt-in marker giving a serde-backed [`PropertyAccess`].
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Player { name: String, hp: u32 }
/// impl SerdeProperties for Player {}
/// ```
///
/// Types that need read-only properties implement [`PropertyAccess`]
/// directly and delegate to [`serde_get`] and [`serde_set`].
pub trait SerdeProperties: Serialize + DeserializeOwned {}

impl<T: SerdeProperties> PropertyAccess for T {
    fn try_get(&self, name: &str) -> Option<PropertyValue> {
        serde_get(self, name)
    }

    fn try_set(&mut self, name: &str, value: PropertyValue) -> bool {
        serde_set(self, name, value)
    }

    fn property_names(&self) -> Vec<String> {
        serde_property_names(self)
    }
}

/// Read a property through the record's serde representation.
pub fn serde_get<T: Serialize>(record: &T, name: &str) -> Option<PropertyValue> {
    let tree = serde_json::to_value(record).ok()?;
    lookup(&tree, name).cloned()
}

/// Write a property through the record's serde representation.
///
/// The property must already exist, and the patched tree must deserialize
/// back into `T`; otherwise nothing changes.
pub fn serde_set<T: Serialize + DeserializeOwned>(
    record: &mut T,
    name: &str,
    value: PropertyValue,
) -> bool {
    let Ok(mut tree) = serde_json::to_value(&*record) else {
        return false;
    };
    let Some(slot) = lookup_mut(&mut tree, name) else {
        return false;
    };
    *slot = value;
    match serde_json::from_value::<T>(tree) {
        Ok(patched) => {
            *record = patched;
            true
        }
        Err(_) => false,
    }
}

/// Top-level field names of the record's serde representation.
pub fn serde_property_names<T: Serialize>(record: &T) -> Vec<String> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

fn lookup<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(tree, |node, segment| as_object(node)?.get(segment))
}

fn lookup_mut<'a>(tree: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.')
        .try_fold(tree, |node, segment| as_object_mut(node)?.get_mut(segment))
}

fn as_object(node: &Value) -> Option<&Map<String, Value>> {
    match node {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn as_object_mut(node: &mut Value) -> Option<&mut Map<String, Value>> {
    match node {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Stats {
        hp: u32,
        mana: u32,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Hero {
        name: String,
        level: u8,
        stats: Stats,
    }

    impl SerdeProperties for Hero {}

    /// Same shape as `Hero`, but `name` cannot be written.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Locked {
        name: String,
        level: u8,
    }

    impl PropertyAccess for Locked {
        fn try_get(&self, name: &str) -> Option<PropertyValue> {
            serde_get(self, name)
        }

        fn try_set(&mut self, name: &str, value: PropertyValue) -> bool {
            name != "name" && serde_set(self, name, value)
        }

        fn property_names(&self) -> Vec<String> {
            serde_property_names(self)
        }
    }

    fn hero() -> Hero {
        Hero {
            name: "ada".into(),
            level: 3,
            stats: Stats { hp: 10, mana: 4 },
        }
    }

    #[test]
    fn get_top_level_and_nested() {
        let h = hero();
        assert_eq!(h.try_get("name"), Some(json!("ada")));
        assert_eq!(h.try_get("stats.hp"), Some(json!(10)));
        assert_eq!(h.try_get("stats"), Some(json!({"hp": 10, "mana": 4})));
    }

    #[test]
    fn get_missing_is_none() {
        let h = hero();
        assert_eq!(h.try_get("armor"), None);
        assert_eq!(h.try_get("stats.armor"), None);
        assert_eq!(h.try_get("name.first"), None);
    }

    #[test]
    fn set_writes_through() {
        let mut h = hero();
        assert!(h.try_set("level", json!(4)));
        assert!(h.try_set("stats.mana", json!(9)));
        assert_eq!(h.level, 4);
        assert_eq!(h.stats.mana, 9);
    }

    #[test]
    fn set_missing_property_fails() {
        let mut h = hero();
        assert!(!h.try_set("armor", json!(1)));
        assert_eq!(h, hero());
    }

    #[test]
    fn set_wrong_type_fails_without_change() {
        let mut h = hero();
        assert!(!h.try_set("level", json!("high")));
        assert!(!h.try_set("level", json!(300)));
        assert_eq!(h, hero());
    }

    #[test]
    fn read_only_property_rejected() {
        let mut l = Locked {
            name: "ada".into(),
            level: 1,
        };
        assert!(!l.try_set("name", json!("bob")));
        assert!(l.try_set("level", json!(2)));
        assert_eq!(l.name, "ada");
        assert_eq!(l.level, 2);
    }

    #[test]
    fn property_names_are_top_level() {
        let mut names = hero().property_names();
        names.sort();
        assert_eq!(names, vec!["level", "name", "stats"]);
    }
}
