//! Per-version descriptors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A column name with the type the upstream inference assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name, unique within a version
    pub name: String,
    /// Inferred type label (e.g. `integer`, `float`, `string`)
    pub inferred_type: String,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, inferred_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inferred_type: inferred_type.into(),
        }
    }
}

/// Index entry for one version. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Version id (`v1`, `v2`, ...)
    pub id: String,
    /// Creation time (UTC)
    pub created_at: DateTime<Utc>,
    /// Originating raw input (path or logical name)
    pub source: String,
    /// Number of data rows
    pub row_count: u64,
    /// Ordered column descriptors
    pub columns: Vec<ColumnSpec>,
    /// Upstream validation score in [0, 1]
    pub quality_score: Option<f64>,
    /// Version directory relative to the storage root
    pub storage_path: String,
    /// Payload digest (`sha256:<hex>`)
    pub file_hash: String,
    /// Payload size in bytes
    pub file_size_bytes: u64,
}

impl VersionRecord {
    /// Builds the index entry from a persisted manifest.
    pub fn from_manifest(manifest: &VersionManifest, storage_path: impl Into<String>) -> Self {
        Self {
            id: manifest.id.clone(),
            created_at: manifest.created_at,
            source: manifest.source.clone(),
            row_count: manifest.row_count,
            columns: manifest.columns.clone(),
            quality_score: manifest.quality_score,
            storage_path: storage_path.into(),
            file_hash: manifest.file_hash.clone(),
            file_size_bytes: manifest.file_size_bytes,
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Looks up a column's inferred type by name.
    pub fn column_type(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.inferred_type.as_str())
    }
}

/// `manifest.json` stored inside each version directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionManifest {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub source: String,
    pub row_count: u64,
    pub columns: Vec<ColumnSpec>,
    pub quality_score: Option<f64>,
    /// Payload file name inside the version directory
    pub payload_file: String,
    pub file_hash: String,
    pub file_size_bytes: u64,
}
