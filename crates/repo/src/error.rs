use recordkit_tracking::TrackingError;
use std::error::Error as StdError;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Opaque failure reported by a storage collaborator.
///
/// Repositories pass these through unmodified.
#[derive(Debug, thiserror::Error)]
#[error("storage failure: {message}")]
pub struct StorageError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors from repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record {key} not found")]
    NotFound { key: String },
    #[error("record {key} already exists")]
    DuplicateKey { key: String },
    #[error("repository not initialized")]
    NotInitialized,
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("property {property:?} of record {key} cannot be written")]
    PropertyRejected { key: String, property: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RepositoryError {
    pub(crate) fn not_found(key: &impl std::fmt::Debug) -> Self {
        Self::NotFound {
            key: format!("{key:?}"),
        }
    }

    pub(crate) fn duplicate(key: &impl std::fmt::Debug) -> Self {
        Self::DuplicateKey {
            key: format!("{key:?}"),
        }
    }
}

impl From<TrackingError> for RepositoryError {
    fn from(e: TrackingError) -> Self {
        match e {
            TrackingError::NotFound { key } => Self::NotFound { key },
            TrackingError::PropertyRejected { key, property } => {
                Self::PropertyRejected { key, property }
            }
        }
    }
}
