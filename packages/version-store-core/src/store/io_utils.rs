//! I/O utilities for crash-safe writes.
//!
//! Every durable write goes through [`stage_temp`] + [`commit_temp`]: bytes
//! land in a uniquely named sibling temp file, are synced, and only then
//! renamed over the final path. A crash at any point leaves either the old
//! file or the new one, never a truncated one.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

use crate::error::{Result, VersionError};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Suffix marker shared by every temp file this crate writes.
pub const TEMP_MARKER: &str = ".tmp.";

/// Wraps an I/O error with the attempted operation and path.
pub fn classify_io_error(error: std::io::Error, operation: &'static str, path: &Path) -> VersionError {
    VersionError::StorageIo {
        operation,
        path: path.to_path_buf(),
        source: error,
    }
}

/// Returns whether a file name belongs to an in-flight or abandoned temp file.
pub fn is_temp_name(name: &str) -> bool {
    name.contains(TEMP_MARKER)
}

fn temp_path_for(final_path: &Path) -> PathBuf {
    let file_name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    final_path.with_file_name(format!(
        "{}{}{}.{}",
        file_name,
        TEMP_MARKER,
        std::process::id(),
        seq
    ))
}

/// Writes `bytes` to a fresh temp file next to `final_path` and syncs it.
///
/// Returns the temp path. The final path is untouched until [`commit_temp`].
pub fn stage_temp(final_path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    let temp_path = temp_path_for(final_path);
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .map_err(|e| classify_io_error(e, "create temp file", &temp_path))?;
    file.write_all(bytes)
        .map_err(|e| classify_io_error(e, "write temp file", &temp_path))?;
    file.sync_all()
        .map_err(|e| classify_io_error(e, "sync temp file", &temp_path))?;
    Ok(temp_path)
}

/// Atomically renames a staged temp file over `final_path`.
pub fn commit_temp(temp_path: &Path, final_path: &Path) -> Result<()> {
    if let Err(e) = fs::rename(temp_path, final_path) {
        let _ = fs::remove_file(temp_path);
        return Err(classify_io_error(e, "rename temp file", final_path));
    }
    if let Some(parent) = final_path.parent() {
        sync_dir(parent)?;
    }
    Ok(())
}

/// Stage and commit in one step.
pub fn write_atomic(final_path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = stage_temp(final_path, bytes)?;
    commit_temp(&temp_path, final_path)
}

/// Serializes `value` as pretty JSON and writes it atomically.
pub fn write_json_atomic<T: serde::Serialize>(final_path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| VersionError::SerializationError(e.to_string()))?;
    write_atomic(final_path, &json)
}

/// Reads a file, mapping `NotFound` to `Ok(None)`.
pub fn read_optional(path: &Path, operation: &'static str) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(classify_io_error(e, operation, path)),
    }
}

/// Flushes directory entries so a completed rename survives power loss.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| classify_io_error(e, "sync directory", dir))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Removes write permission from a file or directory.
pub fn set_read_only(path: &Path) -> Result<()> {
    let metadata =
        fs::metadata(path).map_err(|e| classify_io_error(e, "stat for write-protect", path))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = if metadata.is_dir() { 0o555 } else { 0o444 };
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| classify_io_error(e, "write-protect", path))?;
    }
    #[cfg(not(unix))]
    {
        if metadata.is_file() {
            let mut perms = metadata.permissions();
            perms.set_readonly(true);
            fs::set_permissions(path, perms)
                .map_err(|e| classify_io_error(e, "write-protect", path))?;
        }
    }
    Ok(())
}

/// Gives write permission back to everything under `path` when dropped, so
/// a write-protected tree inside a `TempDir` can be cleaned up.
#[cfg(test)]
pub(crate) struct WritableOnDrop(pub PathBuf);

#[cfg(test)]
impl Drop for WritableOnDrop {
    fn drop(&mut self) {
        fn restore(path: &Path) {
            let Ok(metadata) = fs::symlink_metadata(path) else {
                return;
            };
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = if metadata.is_dir() { 0o755 } else { 0o644 };
                let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
            }
            if metadata.is_dir() {
                for entry in fs::read_dir(path).into_iter().flatten().flatten() {
                    restore(&entry.path());
                }
            }
        }
        restore(&self.0);
    }
}

/// Content digest in `sha256:<hex>` form.
pub fn digest_bytes(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}
