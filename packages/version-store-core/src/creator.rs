//! Turns a cleaned dataset into a new immutable version.

use chrono::Utc;

use crate::config::{ActivationPolicy, VersioningConfig};
use crate::error::{Result, VersionError};
use crate::index::IndexManager;
use crate::metadata::validation::{validate_columns, validate_quality_score};
use crate::metadata::{format_id, ColumnSpec, VersionRecord};
use crate::store::{validate_extension, ManifestDetails, VersionDir, VersionStore};

/// Unreferenced directories skipped before allocation gives up.
const MAX_ALLOCATION_ATTEMPTS: u64 = 64;

/// A tabular payload plus its shape, as handed over by the cleaning stage.
///
/// `row_count` and `columns` are trusted; the payload is opaque bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub payload: Vec<u8>,
    /// Payload file extension without the dot (`csv`, `parquet`, ...)
    pub extension: String,
    pub row_count: u64,
    pub columns: Vec<ColumnSpec>,
}

impl Dataset {
    pub fn new(
        payload: impl Into<Vec<u8>>,
        extension: impl Into<String>,
        row_count: u64,
        columns: Vec<ColumnSpec>,
    ) -> Self {
        Self {
            payload: payload.into(),
            extension: extension.into(),
            row_count,
            columns,
        }
    }

    /// Checks everything that can be checked before an id is consumed.
    pub fn validate(&self) -> Result<()> {
        validate_extension(&self.extension).map_err(VersionError::InvalidDataset)?;
        validate_columns(&self.columns).map_err(VersionError::InvalidDataset)?;
        Ok(())
    }
}

/// Outcome of a successful [`VersionCreator::create`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedVersion {
    pub record: VersionRecord,
    /// Whether the new version became active
    pub activated: bool,
    /// Index revision after the append
    pub revision: u64,
}

/// Allocates, persists and registers new versions.
#[derive(Debug)]
pub struct VersionCreator {
    store: VersionStore,
    index: IndexManager,
    activation: ActivationPolicy,
}

impl VersionCreator {
    pub fn new(config: &VersioningConfig) -> Self {
        Self {
            store: VersionStore::new(config),
            index: IndexManager::new(config),
            activation: config.activation,
        }
    }

    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    pub fn index(&self) -> &IndexManager {
        &self.index
    }

    /// Creates the next version from `dataset`.
    ///
    /// # Arguments
    /// * `dataset` - Payload and shape
    /// * `source` - Originating raw input (path or logical name)
    /// * `quality_score` - Upstream score in [0, 1], if any
    /// * `activate` - Overrides the configured activation policy
    ///
    /// # Returns
    /// The new record. A failure after allocation leaves an unreferenced
    /// directory behind; the id is then skipped, never reused.
    pub fn create(
        &self,
        dataset: &Dataset,
        source: &str,
        quality_score: Option<f64>,
        activate: Option<bool>,
    ) -> Result<CreatedVersion> {
        self.index.load()?;

        if source.trim().is_empty() {
            return Err(VersionError::InvalidDataset("source must not be empty".into()));
        }
        validate_quality_score(quality_score).map_err(VersionError::InvalidDataset)?;
        dataset.validate()?;

        let guard = self.index.lock("create")?;
        let current = self.index.check_revision(&guard, "create")?;
        let dir = self.allocate_next(current.next_sequence(self.index.id_prefix()))?;
        let manifest = self.store.persist(
            &dir,
            &dataset.payload,
            &dataset.extension,
            ManifestDetails {
                created_at: Utc::now(),
                source: source.to_string(),
                row_count: dataset.row_count,
                columns: dataset.columns.clone(),
                quality_score,
            },
        )?;
        let record = VersionRecord::from_manifest(&manifest, dir.storage_path);

        let activated = activate.unwrap_or(self.activation == ActivationPolicy::Auto);
        let index = self
            .index
            .append_locked(&guard, current, record.clone(), activated)?;
        guard.release()?;

        tracing::info!(
            "Created version {} from {} ({} rows, {} columns)",
            record.id,
            record.source,
            record.row_count,
            record.column_count()
        );
        Ok(CreatedVersion {
            record,
            activated,
            revision: index.revision,
        })
    }

    /// Allocates the first free directory at or after `seq`. Directories left
    /// by earlier failed creations are skipped so their ids are never reused.
    fn allocate_next(&self, seq: u64) -> Result<VersionDir> {
        let prefix = self.index.id_prefix();
        let mut last_err = None;
        for candidate in seq..seq.saturating_add(MAX_ALLOCATION_ATTEMPTS) {
            let id = format_id(prefix, candidate);
            match self.store.allocate(&id) {
                Ok(dir) => return Ok(dir),
                Err(e @ VersionError::AlreadyExists { .. }) => {
                    tracing::warn!("Skipping unreferenced version directory {}", id);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            VersionError::InvalidDataset(format!("version sequence exhausted at {}", seq))
        }))
    }
}
