//! Repointing the active version, with an audit trail.
//!
//! Rollback never touches version directories. It swaps the index's active
//! pointer and appends an event to `rollback_history.json`. The history entry
//! is staged first and committed right after the index, so a rollback either
//! moves the pointer and records it or does neither.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::VersioningConfig;
use crate::error::{Result, VersionError};
use crate::index::{CommitLock, IndexManager};
use crate::metadata::VersionIndex;
use crate::store::io_utils::{commit_temp, read_optional, stage_temp};
use crate::store::VersionStore;

/// One effective change of the active pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackEvent {
    pub timestamp: DateTime<Utc>,
    /// Active version before the rollback; `None` if nothing was active
    pub from_version: Option<String>,
    pub to_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct RollbackHistory {
    rollbacks: Vec<RollbackEvent>,
}

/// Result of [`RollbackController::rollback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackOutcome {
    pub previous: Option<String>,
    pub active: String,
    /// False when the target was already active and nothing was written
    pub changed: bool,
}

/// Answer of [`RollbackController::is_safe_to_rollback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackCheck {
    pub safe: bool,
    pub reason: String,
}

impl RollbackCheck {
    fn unsafe_because(reason: String) -> Self {
        Self {
            safe: false,
            reason,
        }
    }
}

#[derive(Debug)]
pub struct RollbackController {
    index: IndexManager,
    store: VersionStore,
    history_path: PathBuf,
}

impl RollbackController {
    pub fn new(config: &VersioningConfig) -> Self {
        Self {
            index: IndexManager::new(config),
            store: VersionStore::new(config),
            history_path: config.history_path(),
        }
    }

    /// Makes `id` the active version.
    ///
    /// Rolling back to the version that is already active succeeds without
    /// writing anything.
    pub fn rollback(&self, id: &str) -> Result<RollbackOutcome> {
        let index = self.index.load()?;
        if !index.contains(id) {
            return Err(VersionError::not_found(id, "rollback"));
        }
        if index.active.as_deref() == Some(id) {
            tracing::info!("Version {} is already active; nothing to do", id);
            return Ok(RollbackOutcome {
                previous: index.active.clone(),
                active: id.to_string(),
                changed: false,
            });
        }
        // The record alone is not enough: its directory must still be readable.
        self.store.manifest(id)?;

        let guard = self.index.lock("rollback")?;
        let current = self.index.check_revision(&guard, "rollback")?;
        let previous = current.active.clone();

        // The history entry is staged before the pointer moves, so a history
        // that cannot be read or written leaves the index untouched.
        let staged = self.stage_history(
            &guard,
            RollbackEvent {
                timestamp: Utc::now(),
                from_version: previous.clone(),
                to_version: id.to_string(),
            },
        )?;
        let updated = match self.index.set_active_locked(&guard, current, id) {
            Ok(updated) => updated,
            Err(e) => {
                let _ = fs::remove_file(&staged);
                return Err(e);
            }
        };
        if let Err(e) = commit_temp(&staged, &self.history_path) {
            self.revert_pointer(&guard, updated, previous.as_deref());
            return Err(e);
        }
        guard.release()?;

        tracing::info!(
            "Rolled back {} -> {}",
            previous.as_deref().unwrap_or("<none>"),
            id
        );
        Ok(RollbackOutcome {
            previous,
            active: id.to_string(),
            changed: true,
        })
    }

    /// Rollback events, oldest first. An absent file is an empty history.
    pub fn history(&self) -> Result<Vec<RollbackEvent>> {
        Ok(self.read_history()?.rollbacks)
    }

    /// Checks whether `id` can be made active.
    pub fn is_safe_to_rollback(&self, id: &str) -> Result<RollbackCheck> {
        let index = self.index.read()?;
        if !index.contains(id) {
            return Ok(RollbackCheck::unsafe_because(format!(
                "Version '{}' does not exist",
                id
            )));
        }
        match self.store.manifest(id) {
            Ok(_) => {}
            Err(VersionError::VersionNotFound { .. }) => {
                return Ok(RollbackCheck::unsafe_because(format!(
                    "Manifest not found for {}",
                    id
                )));
            }
            Err(e) => return Ok(RollbackCheck::unsafe_because(e.to_string())),
        }
        let reason = if index.active.as_deref() == Some(id) {
            format!("Already at version {}; rollback is a no-op", id)
        } else {
            "Safe to rollback".to_string()
        };
        Ok(RollbackCheck { safe: true, reason })
    }

    fn read_history(&self) -> Result<RollbackHistory> {
        match read_optional(&self.history_path, "read rollback history")? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                VersionError::SerializationError(format!(
                    "Failed to parse {}: {}",
                    self.history_path.display(),
                    e
                ))
            }),
            None => Ok(RollbackHistory::default()),
        }
    }

    /// Writes the history with `event` appended to a temp file next to
    /// `rollback_history.json` and returns its path.
    fn stage_history(&self, _guard: &CommitLock, event: RollbackEvent) -> Result<PathBuf> {
        let mut history = self.read_history()?;
        history.rollbacks.push(event);
        let bytes = serde_json::to_vec_pretty(&history)
            .map_err(|e| VersionError::SerializationError(e.to_string()))?;
        stage_temp(&self.history_path, &bytes)
    }

    /// Points the index back at `previous` after the history could not be
    /// committed. Failures are logged; the original error is what the caller
    /// sees.
    fn revert_pointer(&self, guard: &CommitLock, updated: VersionIndex, previous: Option<&str>) {
        let Some(previous) = previous else {
            tracing::error!("Rollback history not written and no previous active version to restore");
            return;
        };
        match self.index.set_active_locked(guard, updated, previous) {
            Ok(_) => tracing::warn!("Rollback history not written; active version restored to {}", previous),
            Err(e) => tracing::error!("Rollback history not written and restoring {} failed: {}", previous, e),
        }
    }
}
