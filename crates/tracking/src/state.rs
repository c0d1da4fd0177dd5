use std::fmt;

/// Classification of a tracked record against its baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeState {
    Unchanged,
    /// New since the last save; has no baseline.
    Added,
    /// Has a baseline and a diverging working copy.
    Modified,
    /// Pending removal; the baseline is kept so the removal can be reverted.
    Deleted,
}

impl ChangeState {
    pub fn is_changed(self) -> bool {
        self != Self::Unchanged
    }
}

impl fmt::Display for ChangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unchanged => "unchanged",
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// Number of keys in each changed state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeCounts {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
}

impl ChangeCounts {
    pub fn total(&self) -> usize {
        self.added + self.modified + self.deleted
    }
}

impl fmt::Display for ChangeCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "added={} modified={} deleted={}",
            self.added, self.modified, self.deleted
        )
    }
}

/// Pending changes partitioned by state, ready to hand to storage.
///
/// Data entries are private copies; storage may keep them.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet<K, T> {
    pub added: Vec<(K, T)>,
    pub modified: Vec<(K, T)>,
    pub deleted: Vec<K>,
}

impl<K, T> ChangeSet<K, T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn counts(&self) -> ChangeCounts {
        ChangeCounts {
            added: self.added.len(),
            modified: self.modified.len(),
            deleted: self.deleted.len(),
        }
    }
}

impl<K, T> Default for ChangeSet<K, T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            modified: Vec::new(),
            deleted: Vec::new(),
        }
    }
}
