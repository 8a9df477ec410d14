//! Versioning configuration.
//!
//! Supports TOML config files, `DSV_*` environment variable overrides, and
//! defaults. Every component receives the configuration explicitly at
//! construction.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VersionError};

/// Whether a freshly created version becomes active immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationPolicy {
    /// Latest version becomes active on creation
    #[default]
    Auto,
    /// Versions are only activated by explicit promotion or rollback
    Manual,
}

impl FromStr for ActivationPolicy {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            other => Err(VersionError::Config(format!(
                "Unknown activation policy '{}' (expected auto or manual)",
                other
            ))),
        }
    }
}

impl fmt::Display for ActivationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Manual => f.write_str("manual"),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Versioning configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersioningConfig {
    /// Storage root holding the index and one directory per version
    pub root: PathBuf,
    /// Version id prefix (`v` gives `v1`, `v2`, ...)
    pub id_prefix: String,
    /// Default activation policy for new versions
    pub activation: ActivationPolicy,
    /// Log verbosity (trace, debug, info, warn, error)
    pub log_level: String,
    /// Maximum versions to retain. Reserved: accepted and validated, never enforced.
    pub max_versions_retained: Option<usize>,
    /// Mark payload, manifest and version directory read-only after persisting
    pub write_protect: bool,
    /// Age after which a leftover commit lock is considered abandoned
    pub lock_stale_after_secs: u64,
    /// Output path for comparison reports; `<root>/version_comparison.json` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/versions"),
            id_prefix: "v".to_string(),
            activation: ActivationPolicy::Auto,
            log_level: "info".to_string(),
            max_versions_retained: None,
            write_protect: true,
            lock_stale_after_secs: 300,
            report_path: None,
        }
    }
}

impl VersioningConfig {
    /// Creates a configuration rooted at `root` with default values otherwise.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            VersionError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| VersionError::Config(format!("Invalid TOML: {}", e)))
    }

    /// Applies environment variable overrides.
    /// Variables are prefixed with `DSV_`, e.g. `DSV_ROOT=/srv/datasets`.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(env::vars().filter(|(key, _)| key.starts_with("DSV_")))
    }

    fn apply_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, val) in vars {
            match key.as_str() {
                "DSV_ROOT" => self.root = PathBuf::from(val),
                "DSV_ID_PREFIX" => self.id_prefix = val,
                "DSV_ACTIVATION" => self.activation = val.parse()?,
                "DSV_LOG_LEVEL" => self.log_level = val,
                "DSV_MAX_VERSIONS_RETAINED" => {
                    self.max_versions_retained = Some(val.parse().map_err(|_| {
                        VersionError::Config(format!("Invalid max_versions_retained: {}", val))
                    })?);
                }
                "DSV_WRITE_PROTECT" => {
                    self.write_protect = val.parse().map_err(|_| {
                        VersionError::Config(format!("Invalid write_protect: {}", val))
                    })?;
                }
                "DSV_LOCK_STALE_AFTER_SECS" => {
                    self.lock_stale_after_secs = val.parse().map_err(|_| {
                        VersionError::Config(format!("Invalid lock_stale_after_secs: {}", val))
                    })?;
                }
                "DSV_REPORT_PATH" => self.report_path = Some(PathBuf::from(val)),
                _ => {}
            }
        }
        Ok(())
    }

    /// Checks values that would otherwise surface as confusing failures later.
    pub fn validate(&self) -> Result<()> {
        let prefix = &self.id_prefix;
        if prefix.is_empty() {
            return Err(VersionError::Config("id_prefix must not be empty".into()));
        }
        if prefix.starts_with('.')
            || prefix.chars().any(|c| c == '/' || c == '\\' || c.is_whitespace())
        {
            return Err(VersionError::Config(format!(
                "id_prefix '{}' is not usable as a directory name",
                prefix
            )));
        }
        if prefix.ends_with(|c: char| c.is_ascii_digit()) {
            return Err(VersionError::Config(format!(
                "id_prefix '{}' must not end with a digit",
                prefix
            )));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(VersionError::Config(format!(
                "Unknown log_level '{}'",
                self.log_level
            )));
        }
        if self.max_versions_retained == Some(0) {
            return Err(VersionError::Config(
                "max_versions_retained must be at least 1 when set".into(),
            ));
        }
        Ok(())
    }

    /// Returns the commit lock staleness bound as a `Duration`.
    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_after_secs)
    }

    /// Path of the master index file.
    pub fn index_path(&self) -> PathBuf {
        self.root.join("versions_index.json")
    }

    /// Path of the rollback audit log.
    pub fn history_path(&self) -> PathBuf {
        self.root.join("rollback_history.json")
    }

    /// Where comparison reports go unless a caller names a path.
    pub fn report_path(&self) -> PathBuf {
        self.report_path
            .clone()
            .unwrap_or_else(|| self.root.join("version_comparison.json"))
    }
}
