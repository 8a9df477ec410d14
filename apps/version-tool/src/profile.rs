//! Dataset shape for `create`: either a `--schema` sidecar or a quick CSV
//! profile (header, row count, type sample).

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use version_store_core::ColumnSpec;

/// Rows sampled per column for type inference.
const TYPE_SAMPLE_ROWS: usize = 100;

/// Row count and columns of a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub row_count: u64,
    pub columns: Vec<ColumnSpec>,
}

/// `--schema` sidecar contents. `row_count` may be omitted for CSV payloads.
#[derive(Debug, Deserialize)]
struct SchemaSidecar {
    row_count: Option<u64>,
    columns: Vec<ColumnSpec>,
}

/// Loads a schema sidecar, falling back to counting CSV rows when the
/// sidecar carries no row count.
pub fn load_schema(path: &Path, payload: &[u8], extension: &str) -> Result<Shape> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read schema {}", path.display()))?;
    let sidecar: SchemaSidecar = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse schema {}", path.display()))?;

    let row_count = match sidecar.row_count {
        Some(rows) => rows,
        None if is_csv(extension) => profile_csv(payload)?.row_count,
        None => bail!(
            "schema {} has no row_count and .{} payloads cannot be counted",
            path.display(),
            extension
        ),
    };
    Ok(Shape {
        row_count,
        columns: sidecar.columns,
    })
}

pub fn is_csv(extension: &str) -> bool {
    extension.eq_ignore_ascii_case("csv")
}

/// Profiles a CSV payload: header names, data row count and a type per
/// column inferred from the first rows. Quoting, embedded newlines and CRLF
/// endings are handled by the `csv` reader; blank lines are skipped.
pub fn profile_csv(payload: &[u8]) -> Result<Shape> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(payload);

    let header = reader.headers().context("Failed to read CSV header")?.clone();
    if header.is_empty() {
        bail!("CSV has no header row");
    }

    let mut sample: Vec<csv::StringRecord> = Vec::with_capacity(TYPE_SAMPLE_ROWS);
    let mut row_count = 0u64;
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read CSV record {}", line + 1))?;
        if sample.len() < TYPE_SAMPLE_ROWS {
            sample.push(record);
        }
        row_count += 1;
    }

    let columns = header
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let values = sample.iter().filter_map(|row| row.get(i));
            ColumnSpec::new(name.trim(), infer_type(values))
        })
        .collect();

    Ok(Shape { row_count, columns })
}

/// Integer, float, boolean, else string. Empty cells are ignored; any
/// non-numeric, non-boolean cell makes the column a string.
fn infer_type<'a>(values: impl Iterator<Item = &'a str>) -> &'static str {
    let (mut ints, mut floats, mut bools, mut strings) = (0, 0, 0, 0);
    for raw in values {
        let value = raw.trim();
        if value.is_empty() {
            continue;
        }
        if value.parse::<i64>().is_ok() {
            ints += 1;
        } else if value.contains('.') && value.parse::<f64>().is_ok() {
            floats += 1;
        } else if is_boolean(value) {
            bools += 1;
        } else {
            strings += 1;
        }
    }

    if strings > 0 || (bools > 0 && ints + floats > 0) {
        "string"
    } else if floats > 0 {
        "float"
    } else if ints > 0 {
        "integer"
    } else if bools > 0 {
        "boolean"
    } else {
        "string"
    }
}

fn is_boolean(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "false" | "yes" | "no"
    )
}
