//! Metadata model: version descriptors, manifests and the master index.

mod index;
mod record;
pub mod validation;

pub use index::{VersionIndex, INDEX_SCHEMA_VERSION};
pub use record::{ColumnSpec, VersionManifest, VersionRecord};

/// Formats the id for sequence number `seq` (`v` + `3` -> `v3`).
pub fn format_id(prefix: &str, seq: u64) -> String {
    format!("{}{}", prefix, seq)
}

/// Parses the numeric suffix of a version id.
///
/// Only canonical ids are accepted: the suffix is a positive integer without
/// leading zeros, so `v01` and `v1` can never both exist.
pub fn parse_sequence(id: &str, prefix: &str) -> Option<u64> {
    let digits = id.strip_prefix(prefix)?;
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    digits.parse().ok()
}
