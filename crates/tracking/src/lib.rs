//! Change tracking: classify every record as unchanged, added, modified or
//! deleted against a baseline snapshot, with optional per-property diffs.
//!
//! # Invariants
//! - A key is in at most one of {added, modified, deleted}.
//! - Added keys have no baseline until a save commits them.
//! - Deleted keys keep their baseline until a save purges it.
//! - A property change record exists only while its two values differ.
//! - `has_changes` is true iff any key is added, modified or deleted, and
//!   subscribers hear about it only when that answer flips.

pub mod error;
pub mod property_tracker;
pub mod signal;
pub mod state;
pub mod tracker;

pub use error::TrackingError;
pub use property_tracker::{PropertyChange, PropertyChangeTracker};
pub use signal::{HasChangesSignal, SubscriptionId};
pub use state::{ChangeCounts, ChangeSet, ChangeState};
pub use tracker::ChangeTracker;

/// Crate name and version, for diagnostics.
pub fn crate_info() -> &'static str {
    concat!("recordkit-tracking v", env!("CARGO_PKG_VERSION"))
}
