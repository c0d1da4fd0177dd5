//! Asset repository: change-tracked payloads with always-resident summaries.
//!
//! Assets are identified by a stable [`AssetId`], independent of their path
//! or display name. Summaries (id, path, name, timestamp, content hash) are
//! loaded for every asset up front; payloads are fetched on first access.
//!
//! # Invariants
//! - The path and name indices always agree with the summaries.
//! - A path held by a pending delete or move stays reserved until save, so
//!   reverting never collides.
//! - Summaries pick up storage-reported hashes and timestamps only after a
//!   fully successful save.

mod error;
pub mod repository;
pub mod storage;
pub mod summary;

pub use error::AssetError;
pub use repository::{AssetConfig, AssetRepository};
pub use storage::{AssetStorage, MemoryAssetStorage};
pub use summary::{AssetMetadata, AssetSummary, SummaryIndex, content_hash};

pub use recordkit_common::AssetId;

/// Crate name and version, for diagnostics.
pub fn crate_info() -> &'static str {
    concat!("recordkit-assets v", env!("CARGO_PKG_VERSION"))
}
