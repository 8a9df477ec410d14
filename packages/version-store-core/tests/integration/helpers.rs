//! Shared fixtures for integration tests.

use std::fs;
use std::path::{Path, PathBuf};

use version_store_core::{ColumnSpec, Dataset, VersioningConfig};

/// Config rooted in a temp directory with default policy. Write protection
/// is off so the temp directory can be removed afterwards.
pub fn config(root: &Path) -> VersioningConfig {
    VersioningConfig {
        report_path: Some(root.join("reports").join("comparison.json")),
        write_protect: false,
        ..VersioningConfig::with_root(root)
    }
}

/// Like [`config`] but with write protection on. Pair it with
/// [`WritableOnDrop`] so cleanup can delete the protected tree.
pub fn protected_config(root: &Path) -> VersioningConfig {
    VersioningConfig {
        write_protect: true,
        ..config(root)
    }
}

/// Restores write permission on everything under a directory when dropped.
/// Declare it after the `TempDir` so it runs first.
pub struct WritableOnDrop(pub PathBuf);

impl Drop for WritableOnDrop {
    fn drop(&mut self) {
        make_writable(&self.0);
    }
}

fn make_writable(path: &Path) {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return;
    };
    let mut permissions = metadata.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        permissions.set_mode(if metadata.is_dir() { 0o755 } else { 0o644 });
    }
    #[cfg(not(unix))]
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(false);
    let _ = fs::set_permissions(path, permissions);

    if metadata.is_dir() {
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                make_writable(&entry.path());
            }
        }
    }
}

/// A CSV dataset with `rows` data rows and the given columns.
///
/// Every cell holds the row number, so payloads differ by shape.
pub fn csv_dataset(rows: u64, columns: &[(&str, &str)]) -> Dataset {
    let header: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
    let mut payload = header.join(",");
    payload.push('\n');
    for row in 0..rows {
        let cells: Vec<String> = columns.iter().map(|_| row.to_string()).collect();
        payload.push_str(&cells.join(","));
        payload.push('\n');
    }

    Dataset::new(
        payload,
        "csv",
        rows,
        columns
            .iter()
            .map(|(name, ty)| ColumnSpec::new(*name, *ty))
            .collect(),
    )
}

pub const CUSTOMER_COLUMNS: [(&str, &str); 5] = [
    ("customer_id", "integer"),
    ("name", "string"),
    ("email", "string"),
    ("age", "integer"),
    ("balance", "float"),
];

/// `CUSTOMER_COLUMNS` plus one extra column.
pub fn customer_columns_v2() -> Vec<(&'static str, &'static str)> {
    let mut columns = CUSTOMER_COLUMNS.to_vec();
    columns.push(("signup_date", "string"));
    columns
}
