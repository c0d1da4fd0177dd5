use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Contract for keys identifying tracked records.
///
/// Ordered so every key set iterates deterministically.
pub trait RecordKey: Ord + Clone + fmt::Debug + Send + Sync + 'static {}

impl<K> RecordKey for K where K: Ord + Clone + fmt::Debug + Send + Sync + 'static {}

/// Stable identity of an asset, independent of its path or display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub Uuid);

/// Errors from parsing or validating an [`AssetId`].
#[derive(Debug, thiserror::Error)]
pub enum AssetIdError {
    #[error("invalid asset id {input:?}: {source}")]
    Parse {
        input: String,
        #[source]
        source: uuid::Error,
    },
    #[error("asset id must not be nil")]
    Nil,
}

impl AssetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The all-zero id. Never valid for a stored asset.
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Reject ids that cannot identify a stored asset.
    pub fn validate(self) -> Result<Self, AssetIdError> {
        if self.is_nil() {
            return Err(AssetIdError::Nil);
        }
        Ok(self)
    }
}

impl Default for AssetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for AssetId {
    type Err = AssetIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::parse_str(s).map_err(|source| AssetIdError::Parse {
            input: s.to_string(),
            source,
        })?;
        Self(uuid).validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_id_uniqueness() {
        let a = AssetId::new();
        let b = AssetId::new();
        assert_ne!(a, b);
        assert!(!a.is_nil());
    }

    #[test]
    fn asset_id_display_parse_roundtrip() {
        let id = AssetId::new();
        let parsed: AssetId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn nil_id_rejected() {
        assert!(matches!(AssetId::nil().validate(), Err(AssetIdError::Nil)));
        let nil = Uuid::nil().to_string();
        assert!(nil.parse::<AssetId>().is_err());
    }

    #[test]
    fn garbage_id_rejected() {
        let err = "not-a-guid".parse::<AssetId>().unwrap_err();
        assert!(err.to_string().contains("not-a-guid"));
    }
}
