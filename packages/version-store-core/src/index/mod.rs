//! Owner of `versions_index.json`.
//!
//! Every mutation is read-modify-write guarded twice: the [`CommitLock`]
//! serializes the check-and-rename step across processes, and the index
//! `revision` observed at [`IndexManager::load`] must still be on disk when
//! the write happens. The lock is also re-checked just before the rename, so
//! a holder whose lock was broken as stale cannot overwrite the next
//! holder's index. Every conflict is surfaced as `ConcurrentModification`;
//! nothing here retries.

pub mod lock;

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use chrono::Utc;

use crate::config::VersioningConfig;
use crate::error::{Result, VersionError};
use crate::metadata::validation::{decode_index, validate_index};
use crate::metadata::{format_id, parse_sequence, VersionIndex, VersionRecord};
use crate::store::io_utils::{read_optional, write_json_atomic};

pub use lock::{CommitLock, LockMeta, LOCK_FILE};

/// Reads and atomically rewrites the master index.
#[derive(Debug)]
pub struct IndexManager {
    /// Storage root holding the index and its lock
    root: PathBuf,
    index_path: PathBuf,
    id_prefix: String,
    stale_after: Duration,
    /// Revision seen by the last load or write through this manager
    observed: RwLock<Option<u64>>,
}

impl IndexManager {
    pub fn new(config: &VersioningConfig) -> Self {
        Self {
            root: config.root.clone(),
            index_path: config.index_path(),
            id_prefix: config.id_prefix.clone(),
            stale_after: config.lock_stale_after(),
            observed: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.index_path
    }

    pub fn id_prefix(&self) -> &str {
        &self.id_prefix
    }

    /// Reads the index without recording its revision.
    ///
    /// An absent file is the bootstrap state: an empty index at revision 0.
    pub fn read(&self) -> Result<VersionIndex> {
        match read_optional(&self.index_path, "read index")? {
            Some(bytes) => decode_index(&bytes, &self.index_path, &self.id_prefix),
            None => Ok(VersionIndex::empty()),
        }
    }

    /// Reads the index and records its revision for the next mutation.
    pub fn load(&self) -> Result<VersionIndex> {
        let index = self.read()?;
        self.observe(index.revision)?;
        tracing::debug!(
            "Loaded index revision {} ({} versions)",
            index.revision,
            index.len()
        );
        Ok(index)
    }

    /// Revision recorded by the last `load` or write, if any.
    pub fn observed_revision(&self) -> Result<Option<u64>> {
        let observed = self.observed.read().map_err(|_| VersionError::LockPoisoned)?;
        Ok(*observed)
    }

    fn observe(&self, revision: u64) -> Result<()> {
        let mut observed = self.observed.write().map_err(|_| VersionError::LockPoisoned)?;
        *observed = Some(revision);
        Ok(())
    }

    /// Takes the cross-process commit lock.
    pub fn lock(&self, operation: &'static str) -> Result<CommitLock> {
        CommitLock::acquire(&self.root, self.stale_after, operation)
    }

    /// Re-reads the index under the commit lock and checks that nobody wrote
    /// since it was observed. With nothing observed yet, the on-disk state
    /// becomes the baseline.
    pub fn check_revision(&self, _guard: &CommitLock, operation: &'static str) -> Result<VersionIndex> {
        let current = self.read()?;
        match self.observed_revision()? {
            Some(observed) if observed != current.revision => {
                Err(VersionError::ConcurrentModification {
                    operation,
                    detail: format!(
                        "index revision is {}, expected {}",
                        current.revision, observed
                    ),
                })
            }
            Some(_) => Ok(current),
            None => {
                self.observe(current.revision)?;
                Ok(current)
            }
        }
    }

    /// Appends a record whose id follows every id already in the index.
    pub fn append(&self, record: VersionRecord) -> Result<VersionIndex> {
        let guard = self.lock("append")?;
        let current = self.check_revision(&guard, "append")?;
        let index = self.append_locked(&guard, current, record, false)?;
        guard.release()?;
        Ok(index)
    }

    /// Appends `record` to an index already checked under `guard`, optionally
    /// making it active in the same write.
    pub fn append_locked(
        &self,
        guard: &CommitLock,
        current: VersionIndex,
        record: VersionRecord,
        activate: bool,
    ) -> Result<VersionIndex> {
        if current.contains(&record.id) {
            return Err(VersionError::AlreadyExists {
                path: self.root.join(&record.storage_path),
                id: record.id,
            });
        }
        // Gaps are allowed (skipped orphans); going backwards is not.
        let next_seq = current.next_sequence(&self.id_prefix);
        match parse_sequence(&record.id, &self.id_prefix) {
            Some(seq) if seq >= next_seq => {}
            Some(_) => {
                return Err(VersionError::ConcurrentModification {
                    operation: "append",
                    detail: format!(
                        "id '{}' precedes the next free id '{}'",
                        record.id,
                        format_id(&self.id_prefix, next_seq)
                    ),
                });
            }
            None => {
                return Err(VersionError::InvalidDataset(format!(
                    "version id '{}' does not have the form {}<n>",
                    record.id, self.id_prefix
                )));
            }
        }

        let mut next = current;
        let id = record.id.clone();
        next.push(record);
        if activate {
            next.active = Some(id.clone());
        }
        let next = self.commit(guard, next)?;
        tracing::info!(
            "Appended version {} at revision {}{}",
            id,
            next.revision,
            if activate { " (active)" } else { "" }
        );
        Ok(next)
    }

    /// Repoints the active pointer. The sole rollback primitive.
    pub fn set_active(&self, id: &str) -> Result<VersionIndex> {
        let guard = self.lock("set_active")?;
        let current = self.check_revision(&guard, "set_active")?;
        let index = self.set_active_locked(&guard, current, id)?;
        guard.release()?;
        Ok(index)
    }

    pub fn set_active_locked(
        &self,
        guard: &CommitLock,
        current: VersionIndex,
        id: &str,
    ) -> Result<VersionIndex> {
        if !current.contains(id) {
            return Err(VersionError::not_found(id, "set_active"));
        }
        let previous = current.active.clone();
        let mut next = current;
        next.active = Some(id.to_string());
        let next = self.commit(guard, next)?;
        tracing::info!(
            "Active version {} -> {} at revision {}",
            previous.as_deref().unwrap_or("<none>"),
            id,
            next.revision
        );
        Ok(next)
    }

    /// Record of the active version, if any.
    pub fn get_active(&self) -> Result<Option<VersionRecord>> {
        let index = self.read()?;
        Ok(index.active_record().cloned())
    }

    fn commit(&self, guard: &CommitLock, mut next: VersionIndex) -> Result<VersionIndex> {
        next.revision += 1;
        next.updated_at = Some(Utc::now());
        validate_index(&next, &self.id_prefix).map_err(VersionError::InvalidDataset)?;
        guard.ensure_held("commit index")?;

        write_json_atomic(&self.index_path, &next)?;
        self.observe(next.revision)?;
        Ok(next)
    }
}
