//! Commit lock serializing index writes across processes.
//!
//! The lock is a file created with create-new semantics. It is never waited
//! on: a held lock is reported as a conflict and the caller retries.
//!
//! Each holder writes a unique token into the file. Release only removes a
//! file that still carries the holder's token, and [`CommitLock::ensure_held`]
//! lets a holder confirm, right before writing, that its lock was not broken
//! as stale in the meantime.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VersionError};
use crate::store::io_utils::classify_io_error;

/// Lock file name under the storage root.
pub const LOCK_FILE: &str = "versions_index.lock";

static TOKEN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMeta {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
    /// Unique per acquisition; identifies the holder
    #[serde(default)]
    pub token: String,
}

impl LockMeta {
    fn fresh() -> Self {
        Self {
            pid: std::process::id(),
            acquired_at: Utc::now(),
            token: new_token(),
        }
    }
}

/// Held commit lock; removed on drop if still ours.
#[derive(Debug)]
pub struct CommitLock {
    path: PathBuf,
    meta: LockMeta,
    released: bool,
}

impl CommitLock {
    /// Takes the lock or fails with `ConcurrentModification`.
    ///
    /// A lock file older than `stale_after` is assumed to belong to a crashed
    /// process and is broken once.
    pub fn acquire(root: &Path, stale_after: Duration, operation: &'static str) -> Result<Self> {
        fs::create_dir_all(root).map_err(|e| classify_io_error(e, "create storage root", root))?;
        let path = root.join(LOCK_FILE);

        match Self::try_create(&path) {
            Ok(lock) => return Ok(lock),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(classify_io_error(e, "acquire commit lock", &path)),
        }

        let observed = match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(classify_io_error(e, "read commit lock", &path)),
        };
        if let Some(observed) = observed {
            if !is_stale(&path, stale_after) {
                return Err(held(&path, operation));
            }
            tracing::warn!(
                "Breaking stale commit lock {} (holder: {})",
                path.display(),
                describe(&observed)
            );
            break_stale(&path, &observed, stale_after, operation)?;
        }

        Self::try_create(&path).map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                held(&path, operation)
            } else {
                classify_io_error(e, "acquire commit lock", &path)
            }
        })
    }

    fn try_create(path: &Path) -> std::io::Result<Self> {
        let meta = LockMeta::fresh();
        let json = serde_json::to_vec(&meta)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        if let Err(e) = file.write_all(&json).and_then(|()| file.sync_all()) {
            let _ = fs::remove_file(path);
            return Err(e);
        }
        Ok(Self {
            path: path.to_path_buf(),
            meta,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta(&self) -> &LockMeta {
        &self.meta
    }

    /// Fails with `ConcurrentModification` unless the lock file on disk is
    /// still this holder's.
    pub fn ensure_held(&self, operation: &'static str) -> Result<()> {
        let holder = match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice::<LockMeta>(&bytes).ok(),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(classify_io_error(e, "read commit lock", &self.path)),
        };
        match holder {
            Some(meta) if !self.released && meta.token == self.meta.token => Ok(()),
            Some(meta) => Err(VersionError::ConcurrentModification {
                operation,
                detail: format!(
                    "commit lock {} was taken over by pid {}",
                    self.path.display(),
                    meta.pid
                ),
            }),
            None => Err(VersionError::ConcurrentModification {
                operation,
                detail: format!("commit lock {} is no longer held", self.path.display()),
            }),
        }
    }

    fn owns_file(&self) -> bool {
        fs::read(&self.path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<LockMeta>(&bytes).ok())
            .is_some_and(|meta| meta.token == self.meta.token)
    }

    /// Releases the lock, surfacing a removal failure. A lock that was broken
    /// and re-taken by someone else is left in place.
    pub fn release(mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        if !self.owns_file() {
            tracing::warn!(
                "Commit lock {} is no longer ours; leaving it in place",
                self.path.display()
            );
            return Ok(());
        }
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(classify_io_error(e, "release commit lock", &self.path)),
        }
    }
}

impl Drop for CommitLock {
    fn drop(&mut self) {
        if !self.released && self.owns_file() {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Moves a stale lock aside and deletes it, but only if the file moved is
/// the one judged stale. A lock re-taken in between is put back.
fn break_stale(
    path: &Path,
    observed: &[u8],
    stale_after: Duration,
    operation: &'static str,
) -> Result<()> {
    let aside = path.with_file_name(format!("{}.stale.{}", LOCK_FILE, new_token()));
    match fs::rename(path, &aside) {
        Ok(()) => {}
        // Someone else broke it first.
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(classify_io_error(e, "break stale lock", path)),
    }

    let moved = fs::read(&aside).map_err(|e| classify_io_error(e, "read stale lock", &aside))?;
    if moved == observed && is_stale(&aside, stale_after) {
        fs::remove_file(&aside).map_err(|e| classify_io_error(e, "break stale lock", &aside))?;
        return Ok(());
    }

    // Not the file judged stale: hand it back unless a new lock already exists.
    if fs::hard_link(&aside, path).is_err() {
        tracing::warn!(
            "Displaced commit lock ({}) could not be restored",
            describe(&moved)
        );
    }
    let _ = fs::remove_file(&aside);
    Err(held(path, operation))
}

fn held(path: &Path, operation: &'static str) -> VersionError {
    let holder = fs::read(path)
        .map(|bytes| describe(&bytes))
        .unwrap_or_else(|_| "unknown holder".to_string());
    VersionError::ConcurrentModification {
        operation,
        detail: format!("commit lock {} is held by {}", path.display(), holder),
    }
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > stale_after)
}

fn describe(bytes: &[u8]) -> String {
    serde_json::from_slice::<LockMeta>(bytes)
        .map(|meta| format!("pid {} since {}", meta.pid, meta.acquired_at.to_rfc3339()))
        .unwrap_or_else(|_| "unknown holder".to_string())
}

fn new_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    format!(
        "{}-{:x}-{}",
        std::process::id(),
        nanos,
        TOKEN_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}
