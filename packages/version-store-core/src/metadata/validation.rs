//! Decoding and integrity validation for the index file.

use std::collections::HashSet;
use std::path::{Component, Path};

use serde::Deserialize;

use crate::error::{Result, VersionError};

use super::{parse_sequence, ColumnSpec, VersionIndex, VersionRecord, INDEX_SCHEMA_VERSION};

#[derive(Deserialize)]
struct FormatProbe {
    schema_version: Option<u32>,
}

/// Decodes `versions_index.json`, failing with `CorruptIndex` on anything
/// other than a well-formed index of a known format.
pub fn decode_index(bytes: &[u8], path: &Path, prefix: &str) -> Result<VersionIndex> {
    let probe: FormatProbe = serde_json::from_slice(bytes)
        .map_err(|e| VersionError::corrupt(path, format!("not a JSON object: {}", e)))?;
    match probe.schema_version {
        Some(INDEX_SCHEMA_VERSION) => {}
        Some(other) => {
            return Err(VersionError::corrupt(
                path,
                format!("unsupported schema_version {}", other),
            ))
        }
        None => return Err(VersionError::corrupt(path, "missing schema_version")),
    }

    let mut index: VersionIndex = serde_json::from_slice(bytes)
        .map_err(|e| VersionError::corrupt(path, e.to_string()))?;

    if index.active.as_deref() == Some("") {
        index.active = None;
    }

    validate_index(&index, prefix).map_err(|reason| VersionError::corrupt(path, reason))?;
    Ok(index)
}

/// Checks the index invariants: active pointer, id form and order, records.
pub fn validate_index(index: &VersionIndex, prefix: &str) -> std::result::Result<(), String> {
    if let Some(active) = &index.active {
        if !index.contains(active) {
            return Err(format!(
                "active version '{}' is not present in versions",
                active
            ));
        }
    }

    let mut last_seq = 0u64;
    for record in index.records() {
        let seq = parse_sequence(&record.id, prefix).ok_or_else(|| {
            format!(
                "version id '{}' does not have the form {}<n>",
                record.id, prefix
            )
        })?;
        if seq <= last_seq {
            return Err(format!(
                "version '{}' is out of creation order",
                record.id
            ));
        }
        last_seq = seq;
        validate_record(record)?;
    }

    if index.revision == 0 && !index.is_empty() {
        return Err("non-empty index with revision 0".to_string());
    }
    Ok(())
}

fn validate_record(record: &VersionRecord) -> std::result::Result<(), String> {
    validate_storage_path(&record.storage_path)
        .map_err(|e| format!("version '{}': {}", record.id, e))?;
    validate_columns(&record.columns).map_err(|e| format!("version '{}': {}", record.id, e))?;
    validate_quality_score(record.quality_score)
        .map_err(|e| format!("version '{}': {}", record.id, e))?;
    if !record.file_hash.starts_with("sha256:") {
        return Err(format!(
            "version '{}': file_hash '{}' is not a sha256 digest",
            record.id, record.file_hash
        ));
    }
    Ok(())
}

/// Column names must be non-empty and unique.
pub fn validate_columns(columns: &[ColumnSpec]) -> std::result::Result<(), String> {
    let mut seen = HashSet::with_capacity(columns.len());
    for column in columns {
        if column.name.is_empty() {
            return Err("empty column name".to_string());
        }
        if !seen.insert(column.name.as_str()) {
            return Err(format!("duplicate column name '{}'", column.name));
        }
    }
    Ok(())
}

/// Quality scores are optional; when present they lie in [0, 1].
pub fn validate_quality_score(score: Option<f64>) -> std::result::Result<(), String> {
    match score {
        Some(s) if !(0.0..=1.0).contains(&s) => {
            Err(format!("quality_score {} is outside [0, 1]", s))
        }
        _ => Ok(()),
    }
}

fn validate_storage_path(storage_path: &str) -> std::result::Result<(), String> {
    let path = Path::new(storage_path);
    if storage_path.is_empty() {
        return Err("empty storage_path".to_string());
    }
    if !path
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(format!(
            "storage_path '{}' must be relative to the storage root",
            storage_path
        ));
    }
    Ok(())
}
