//! Filesystem layout for version directories.
//!
//! ```text
//! <root>/
//!   <version-id>/
//!     manifest.json
//!     payload.<ext>
//! ```
//!
//! A version directory is created once, filled once and then write-protected.
//! Nothing in this module deletes or rewrites a completed version.

pub mod io_utils;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::VersioningConfig;
use crate::error::{Result, VersionError};
use crate::metadata::{parse_sequence, ColumnSpec, VersionIndex, VersionManifest};

use io_utils::{classify_io_error, commit_temp, digest_bytes, set_read_only, stage_temp};

/// Manifest file name inside each version directory.
pub const MANIFEST_FILE: &str = "manifest.json";
/// Payload file stem; the extension comes from the dataset.
pub const PAYLOAD_STEM: &str = "payload";

/// A freshly allocated, still empty version directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDir {
    pub id: String,
    /// Absolute (root-joined) path
    pub path: PathBuf,
    /// Path relative to the storage root, as recorded in the index
    pub storage_path: String,
}

/// Descriptive fields written to the manifest alongside the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDetails {
    pub created_at: DateTime<Utc>,
    pub source: String,
    pub row_count: u64,
    pub columns: Vec<ColumnSpec>,
    pub quality_score: Option<f64>,
}

/// A version as read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVersion {
    pub manifest: VersionManifest,
    pub payload: Vec<u8>,
}

/// Filesystem store for version directories.
#[derive(Debug, Clone)]
pub struct VersionStore {
    /// Storage root
    root: PathBuf,
    /// Write-protect completed versions
    write_protect: bool,
}

impl VersionStore {
    /// Creates a store with the given configuration.
    pub fn new(config: &VersioningConfig) -> Self {
        Self {
            root: config.root.clone(),
            write_protect: config.write_protect,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a version id to its directory, rejecting ids that would
    /// escape the storage root.
    pub fn version_dir(&self, id: &str) -> Result<PathBuf> {
        let is_plain = !id.is_empty()
            && id != "."
            && id != ".."
            && !id.contains(['/', '\\'])
            && !io_utils::is_temp_name(id);
        if !is_plain {
            return Err(VersionError::not_found(id, "resolve version directory"));
        }
        Ok(self.root.join(id))
    }

    /// Creates a new, empty directory for `id`.
    ///
    /// # Returns
    /// `AlreadyExists` if anything occupies the path.
    pub fn allocate(&self, id: &str) -> Result<VersionDir> {
        fs::create_dir_all(&self.root)
            .map_err(|e| classify_io_error(e, "create storage root", &self.root))?;
        let path = self.version_dir(id)?;

        match fs::create_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(VersionError::AlreadyExists {
                    id: id.to_string(),
                    path,
                });
            }
            Err(e) => return Err(classify_io_error(e, "allocate version directory", &path)),
        }

        tracing::debug!("Allocated version directory {}", path.display());
        Ok(VersionDir {
            id: id.to_string(),
            path,
            storage_path: id.to_string(),
        })
    }

    /// Writes the payload and manifest into an allocated directory.
    ///
    /// The payload is committed first and the manifest last, so a directory
    /// with a manifest always holds a complete payload. Both go through
    /// temp-file-then-rename.
    pub fn persist(
        &self,
        dir: &VersionDir,
        payload: &[u8],
        extension: &str,
        details: ManifestDetails,
    ) -> Result<VersionManifest> {
        validate_extension(extension).map_err(VersionError::InvalidDataset)?;

        let payload_file = format!("{}.{}", PAYLOAD_STEM, extension);
        let payload_path = dir.path.join(&payload_file);
        let manifest_path = dir.path.join(MANIFEST_FILE);
        for existing in [&payload_path, &manifest_path] {
            if existing.exists() {
                return Err(VersionError::AlreadyExists {
                    id: dir.id.clone(),
                    path: existing.clone(),
                });
            }
        }

        let manifest = VersionManifest {
            id: dir.id.clone(),
            created_at: details.created_at,
            source: details.source,
            row_count: details.row_count,
            columns: details.columns,
            quality_score: details.quality_score,
            payload_file,
            file_hash: digest_bytes(payload),
            file_size_bytes: payload.len() as u64,
        };

        let temp = stage_temp(&payload_path, payload)?;
        commit_temp(&temp, &payload_path)?;

        let manifest_json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| VersionError::SerializationError(e.to_string()))?;
        let temp = stage_temp(&manifest_path, &manifest_json)?;
        commit_temp(&temp, &manifest_path)?;

        if self.write_protect {
            set_read_only(&payload_path)?;
            set_read_only(&manifest_path)?;
            set_read_only(&dir.path)?;
        }

        tracing::debug!(
            "Persisted {} ({} bytes, {})",
            dir.id,
            manifest.file_size_bytes,
            manifest.file_hash
        );
        Ok(manifest)
    }

    /// Reads only the manifest of a version.
    pub fn manifest(&self, id: &str) -> Result<VersionManifest> {
        let dir = self.version_dir(id)?;
        let manifest_path = dir.join(MANIFEST_FILE);
        let bytes = io_utils::read_optional(&manifest_path, "read manifest")?
            .ok_or_else(|| VersionError::not_found(id, "read manifest"))?;
        let manifest: VersionManifest = serde_json::from_slice(&bytes).map_err(|e| {
            VersionError::SerializationError(format!(
                "Failed to parse {}: {}",
                manifest_path.display(),
                e
            ))
        })?;
        if manifest.id != id {
            return Err(VersionError::SerializationError(format!(
                "Manifest {} describes '{}', expected '{}'",
                manifest_path.display(),
                manifest.id,
                id
            )));
        }
        Ok(manifest)
    }

    /// Loads a previously persisted version.
    pub fn read(&self, id: &str) -> Result<StoredVersion> {
        let manifest = self.manifest(id)?;
        let payload_path = self.version_dir(id)?.join(&manifest.payload_file);
        let payload = io_utils::read_optional(&payload_path, "read payload")?
            .ok_or_else(|| VersionError::not_found(id, "read payload"))?;
        Ok(StoredVersion { manifest, payload })
    }

    /// Recomputes the payload digest and checks it against the manifest.
    pub fn verify(&self, id: &str) -> Result<VersionManifest> {
        let stored = self.read(id)?;
        let actual = digest_bytes(&stored.payload);
        if actual != stored.manifest.file_hash
            || stored.payload.len() as u64 != stored.manifest.file_size_bytes
        {
            return Err(VersionError::IntegrityMismatch {
                id: id.to_string(),
                expected: stored.manifest.file_hash,
                actual,
            });
        }
        Ok(stored.manifest)
    }

    /// Version-shaped directories under the root that the index does not
    /// reference. They are left behind by creations that failed after
    /// allocation and are never reclaimed here.
    pub fn unreferenced_dirs(&self, index: &VersionIndex, prefix: &str) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(classify_io_error(e, "scan storage root", &self.root)),
        };

        let mut found: Vec<(u64, String)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| classify_io_error(e, "scan storage root", &self.root))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(seq) = parse_sequence(&name, prefix) else {
                continue;
            };
            if entry.path().is_dir() && !index.contains(&name) {
                found.push((seq, name));
            }
        }
        found.sort();
        Ok(found.into_iter().map(|(_, name)| name).collect())
    }
}

pub(crate) fn validate_extension(extension: &str) -> std::result::Result<(), String> {
    if extension.is_empty()
        || extension.len() > 16
        || !extension.bytes().all(|b| b.is_ascii_alphanumeric())
    {
        return Err(format!(
            "payload extension '{}' must be 1-16 ASCII alphanumerics",
            extension
        ));
    }
    Ok(())
}
