use recordkit_common::{AssetId, AssetIdError};
use recordkit_repo::StorageError;
use recordkit_tracking::TrackingError;

/// Errors from asset operations.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(AssetId),
    #[error("asset id {0} is already in use")]
    DuplicateId(AssetId),
    #[error("asset path {0:?} is already in use")]
    DuplicatePath(String),
    #[error("asset name {0:?} is already in use")]
    DuplicateName(String),
    #[error(transparent)]
    InvalidId(#[from] AssetIdError),
    #[error("invalid asset path {0:?}")]
    InvalidPath(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("property {property:?} of asset {id} cannot be written")]
    PropertyRejected { id: AssetId, property: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AssetError {
    /// Re-key a tracker error with the asset it concerns.
    pub(crate) fn from_tracking(id: AssetId, err: TrackingError) -> Self {
        match err {
            TrackingError::NotFound { .. } => Self::NotFound(id),
            TrackingError::PropertyRejected { property, .. } => {
                Self::PropertyRejected { id, property }
            }
        }
    }
}
