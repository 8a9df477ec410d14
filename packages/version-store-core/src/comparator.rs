//! Metadata-only diff between two versions.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::VersioningConfig;
use crate::error::{Result, VersionError};
use crate::index::IndexManager;
use crate::metadata::VersionRecord;
use crate::store::io_utils::{classify_io_error, write_json_atomic};

/// A shared column whose inferred type differs between the two versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeChange {
    pub column: String,
    pub from: String,
    pub to: String,
}

/// Sign of the row count change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeDirection {
    #[serde(rename = "increase")]
    Increase,
    #[serde(rename = "decrease")]
    Decrease,
    #[serde(rename = "no change")]
    NoChange,
}

impl fmt::Display for ChangeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Increase => f.write_str("increase"),
            Self::Decrease => f.write_str("decrease"),
            Self::NoChange => f.write_str("no change"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub total_differences: usize,
    pub key_changes: Vec<String>,
}

/// Structured diff of `version_b` against `version_a`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub version_a: String,
    pub version_b: String,
    pub compared_at: DateTime<Utc>,
    pub created_at_a: DateTime<Utc>,
    pub created_at_b: DateTime<Utc>,
    pub row_count_a: u64,
    pub row_count_b: u64,
    /// `row_count(b) - row_count(a)`
    pub row_count_delta: i64,
    /// Delta relative to `a`, in percent, rounded to two places; 0 when `a` is empty
    pub percentage_change: f64,
    pub direction: ChangeDirection,
    /// Columns only in `b`, in `b`'s order
    pub columns_added: Vec<String>,
    /// Columns only in `a`, in `a`'s order
    pub columns_removed: Vec<String>,
    /// Columns in both, in `a`'s order
    pub common_columns: Vec<String>,
    pub type_changes: Vec<TypeChange>,
    pub summary: ComparisonSummary,
}

impl ComparisonReport {
    /// Diffs two records. Pure: no I/O, no clock besides `compared_at`.
    pub fn between(a: &VersionRecord, b: &VersionRecord, compared_at: DateTime<Utc>) -> Self {
        let names_a: HashSet<&str> = a.columns.iter().map(|c| c.name.as_str()).collect();
        let names_b: HashSet<&str> = b.columns.iter().map(|c| c.name.as_str()).collect();

        let columns_added: Vec<String> = b
            .columns
            .iter()
            .filter(|c| !names_a.contains(c.name.as_str()))
            .map(|c| c.name.clone())
            .collect();
        let columns_removed: Vec<String> = a
            .columns
            .iter()
            .filter(|c| !names_b.contains(c.name.as_str()))
            .map(|c| c.name.clone())
            .collect();

        let mut common_columns = Vec::new();
        let mut type_changes = Vec::new();
        for column in &a.columns {
            let Some(to) = b.column_type(&column.name) else {
                continue;
            };
            common_columns.push(column.name.clone());
            if to != column.inferred_type {
                type_changes.push(TypeChange {
                    column: column.name.clone(),
                    from: column.inferred_type.clone(),
                    to: to.to_string(),
                });
            }
        }

        // Row counts are u64, so the exact difference needs i128. The reported
        // delta saturates at the i64 bounds.
        let exact_delta = i128::from(b.row_count) - i128::from(a.row_count);
        let row_count_delta = i64::try_from(exact_delta).unwrap_or(if exact_delta > 0 {
            i64::MAX
        } else {
            i64::MIN
        });
        let percentage_change = if a.row_count > 0 {
            round2(exact_delta as f64 / a.row_count as f64 * 100.0)
        } else {
            0.0
        };
        let direction = match exact_delta.signum() {
            1 => ChangeDirection::Increase,
            -1 => ChangeDirection::Decrease,
            _ => ChangeDirection::NoChange,
        };

        let summary = summarize(
            row_count_delta,
            percentage_change,
            columns_added.len(),
            columns_removed.len(),
            type_changes.len(),
        );

        Self {
            version_a: a.id.clone(),
            version_b: b.id.clone(),
            compared_at,
            created_at_a: a.created_at,
            created_at_b: b.created_at,
            row_count_a: a.row_count,
            row_count_b: b.row_count,
            row_count_delta,
            percentage_change,
            direction,
            columns_added,
            columns_removed,
            common_columns,
            type_changes,
            summary,
        }
    }

    /// No row, column or type differences.
    pub fn is_identical(&self) -> bool {
        self.summary.total_differences == 0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn summarize(
    row_count_delta: i64,
    percentage_change: f64,
    added: usize,
    removed: usize,
    type_changes: usize,
) -> ComparisonSummary {
    let mut key_changes = Vec::new();
    if row_count_delta != 0 {
        key_changes.push(format!(
            "Row count changed by {:+} ({:+.2}%)",
            row_count_delta, percentage_change
        ));
    }
    if added > 0 {
        key_changes.push(format!("{} columns added", added));
    }
    if removed > 0 {
        key_changes.push(format!("{} columns removed", removed));
    }
    if type_changes > 0 {
        key_changes.push(format!("{} data types changed", type_changes));
    }
    let total_differences = key_changes.len();
    if total_differences == 0 {
        key_changes.push("No significant differences found".to_string());
    }
    ComparisonSummary {
        total_differences,
        key_changes,
    }
}

/// Compares versions registered in the index.
#[derive(Debug)]
pub struct VersionComparator {
    index: IndexManager,
    report_path: PathBuf,
}

impl VersionComparator {
    pub fn new(config: &VersioningConfig) -> Self {
        Self {
            index: IndexManager::new(config),
            report_path: config.report_path(),
        }
    }

    /// Diffs `b` against `a`; `VersionNotFound` if either is unknown.
    pub fn compare(&self, a: &str, b: &str) -> Result<ComparisonReport> {
        let index = self.index.read()?;
        let record_a = index
            .get(a)
            .ok_or_else(|| VersionError::not_found(a, "compare"))?;
        let record_b = index
            .get(b)
            .ok_or_else(|| VersionError::not_found(b, "compare"))?;

        let report = ComparisonReport::between(record_a, record_b, Utc::now());
        tracing::debug!(
            "Compared {} -> {}: {} differences",
            a,
            b,
            report.summary.total_differences
        );
        Ok(report)
    }

    /// Writes the report atomically to `path`, or to the configured report
    /// path when none is given. Returns the path written.
    pub fn save_report(&self, report: &ComparisonReport, path: Option<&Path>) -> Result<PathBuf> {
        let path = path.unwrap_or(self.report_path.as_path()).to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| classify_io_error(e, "create report directory", parent))?;
        }
        write_json_atomic(&path, report)?;
        tracing::info!(
            "Saved comparison {} -> {} to {}",
            report.version_a,
            report.version_b,
            path.display()
        );
        Ok(path)
    }
}
