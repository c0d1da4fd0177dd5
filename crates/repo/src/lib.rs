//! Repositories: load records from storage, edit them in memory, save only
//! what changed.
//!
//! # Invariants
//! - A failed save leaves every baseline, working copy and key set exactly
//!   as it was; retrying is always safe.
//! - Lazy loads distinguish "not found" from storage failure.
//! - Storage is reached only through the traits in [`storage`].

pub mod error;
pub mod memory;
pub mod single;
pub mod storage;
pub mod table;

pub use error::{RepositoryError, StorageError};
pub use memory::{MemorySingleStorage, MemoryTableStorage};
pub use single::SingleRepository;
pub use storage::{Keyed, Lookup, SingleStorage, TableStorage};
pub use table::{TableConfig, TableRepository};

pub use recordkit_tracking::{ChangeCounts, ChangeSet, ChangeState, SubscriptionId};

/// Crate name and version, for diagnostics.
pub fn crate_info() -> &'static str {
    concat!("recordkit-repo v", env!("CARGO_PKG_VERSION"))
}
