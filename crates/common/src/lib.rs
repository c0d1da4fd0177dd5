//! Shared record contracts for the change-tracking engine.
//!
//! # Invariants
//! - Every tracked record type is `Clone + PartialEq`; baselines and working
//!   copies are always distinct owned values.
//! - Property access never panics: unknown or read-only properties report
//!   absence or rejection.

pub mod property;
pub mod snapshot;
pub mod types;

pub use property::{PropertyAccess, PropertyValue, SerdeProperties};
pub use snapshot::{Record, deep_clone, deep_equals, deep_equals_opt, values_equal};
pub use types::{AssetId, AssetIdError, RecordKey};

/// Crate name and version, for diagnostics.
pub fn crate_info() -> &'static str {
    concat!("recordkit-common v", env!("CARGO_PKG_VERSION"))
}
