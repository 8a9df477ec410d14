//! Versioning core for tabular datasets.
//!
//! Snapshots datasets into immutable, write-protected version directories,
//! keeps a master index with a single active pointer, diffs versions by
//! metadata and rolls the active pointer back without touching stored data.

pub mod comparator;
pub mod config;
pub mod creator;
pub mod error;
pub mod index;
pub mod metadata;
pub mod rollback;
pub mod store;

pub use comparator::{ComparisonReport, TypeChange, VersionComparator};
pub use config::{ActivationPolicy, VersioningConfig};
pub use creator::{CreatedVersion, Dataset, VersionCreator};
pub use error::{Result, VersionError};
pub use index::IndexManager;
pub use metadata::{ColumnSpec, VersionIndex, VersionRecord};
pub use rollback::{RollbackController, RollbackEvent};
pub use store::VersionStore;
