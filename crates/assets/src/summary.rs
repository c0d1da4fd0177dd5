use chrono::{DateTime, Utc};
use recordkit_common::AssetId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Always-resident projection of an asset: identity and location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSummary {
    pub id: AssetId,
    pub path: String,
    pub name: String,
    /// Set by storage when the asset is written. `None` until first save.
    pub modified_at: Option<DateTime<Utc>>,
    /// Hex SHA-256 of the stored payload. `None` until first save.
    pub content_hash: Option<String>,
}

impl AssetSummary {
    pub fn new(id: AssetId, path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            path: path.into(),
            name: name.into(),
            modified_at: None,
            content_hash: None,
        }
    }
}

/// Caller-supplied identity hints for a new asset.
#[derive(Debug, Clone, Default)]
pub struct AssetMetadata {
    /// Stable id to use. A fresh one is generated when absent.
    pub id: Option<AssetId>,
    /// Display name. Derived from the path when absent.
    pub name: Option<String>,
}

impl AssetMetadata {
    pub fn with_id(id: AssetId) -> Self {
        Self {
            id: Some(id),
            name: None,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }
}

/// Canonical form of an asset path: forward slashes, no surrounding
/// whitespace, no leading `./`.
pub fn normalize_path(path: &str) -> String {
    let path = path.trim().replace('\\', "/");
    path.strip_prefix("./").unwrap_or(&path).to_string()
}

/// Display name implied by a path: its last segment without extension.
pub fn name_from_path(path: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file.to_string(),
    }
}

/// Hex SHA-256 over a serialized payload.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Summaries plus the path and name lookups derived from them.
///
/// Every mutation goes through [`insert`](Self::insert) or
/// [`remove`](Self::remove), which keep all three maps in lockstep.
#[derive(Debug, Clone, Default)]
pub struct SummaryIndex {
    summaries: BTreeMap<AssetId, AssetSummary>,
    by_path: BTreeMap<String, AssetId>,
    by_name: BTreeMap<String, BTreeSet<AssetId>>,
}

impl SummaryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the summary for `summary.id`.
    pub fn insert(&mut self, summary: AssetSummary) {
        self.remove(summary.id);
        self.by_path.insert(summary.path.clone(), summary.id);
        self.by_name
            .entry(summary.name.clone())
            .or_default()
            .insert(summary.id);
        self.summaries.insert(summary.id, summary);
    }

    pub fn remove(&mut self, id: AssetId) -> Option<AssetSummary> {
        let summary = self.summaries.remove(&id)?;
        if self.by_path.get(&summary.path) == Some(&id) {
            self.by_path.remove(&summary.path);
        }
        if let Some(ids) = self.by_name.get_mut(&summary.name) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_name.remove(&summary.name);
            }
        }
        Some(summary)
    }

    pub fn get(&self, id: AssetId) -> Option<&AssetSummary> {
        self.summaries.get(&id)
    }

    pub fn contains(&self, id: AssetId) -> bool {
        self.summaries.contains_key(&id)
    }

    pub fn id_for_path(&self, path: &str) -> Option<AssetId> {
        self.by_path.get(path).copied()
    }

    pub fn ids_for_name(&self, name: &str) -> impl Iterator<Item = AssetId> + '_ {
        self.by_name.get(name).into_iter().flatten().copied()
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetSummary> {
        self.summaries.values()
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    pub fn clear(&mut self) {
        self.summaries.clear();
        self.by_path.clear();
        self.by_name.clear();
    }
}
