/// Errors from change tracking operations.
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("record {key} not found")]
    NotFound { key: String },
    #[error("property {property:?} of record {key} cannot be written")]
    PropertyRejected { key: String, property: String },
}

impl TrackingError {
    pub(crate) fn not_found(key: &impl std::fmt::Debug) -> Self {
        Self::NotFound {
            key: format!("{key:?}"),
        }
    }

    pub(crate) fn property_rejected(key: &impl std::fmt::Debug, property: &str) -> Self {
        Self::PropertyRejected {
            key: format!("{key:?}"),
            property: property.to_string(),
        }
    }
}
