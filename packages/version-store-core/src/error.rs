//! Versioning error types.

use std::path::PathBuf;

use thiserror::Error;

/// Versioning operation errors.
#[derive(Error, Debug)]
pub enum VersionError {
    /// Version directory is already occupied
    #[error("Version '{id}' already exists at {path} (index and filesystem out of sync)")]
    AlreadyExists { id: String, path: PathBuf },

    /// Unknown version id
    #[error("Version '{id}' not found during {operation}")]
    VersionNotFound { id: String, operation: &'static str },

    /// Index file failed validation on load
    #[error("Corrupt index {path}: {reason}")]
    CorruptIndex { path: PathBuf, reason: String },

    /// Optimistic revision check failed; reload and retry
    #[error("Concurrent modification during {operation}: {detail}")]
    ConcurrentModification {
        operation: &'static str,
        detail: String,
    },

    /// Underlying filesystem failure
    #[error("Storage I/O error during {operation} on {path}: {source}")]
    StorageIo {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Dataset rejected before any write
    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    /// Payload digest does not match the manifest
    #[error("Integrity mismatch for version '{id}': manifest {expected}, payload {actual}")]
    IntegrityMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// In-process lock poisoned by a panicking thread
    #[error("Lock poisoned")]
    LockPoisoned,
}

impl VersionError {
    pub(crate) fn not_found(id: impl Into<String>, operation: &'static str) -> Self {
        Self::VersionNotFound {
            id: id.into(),
            operation,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptIndex {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Stable process exit code for each error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AlreadyExists { .. } => 3,
            Self::VersionNotFound { .. } => 4,
            Self::CorruptIndex { .. } => 5,
            Self::ConcurrentModification { .. } => 6,
            Self::StorageIo { .. } => 7,
            Self::InvalidDataset(_) => 8,
            Self::IntegrityMismatch { .. } => 9,
            Self::SerializationError(_) | Self::Config(_) | Self::LockPoisoned => 2,
        }
    }

    /// Whether retrying the whole operation can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VersionError>;
