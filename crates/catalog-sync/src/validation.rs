//! Structural checks on downloaded backups and exported catalog files
//!
//! Both checks are read-only. A backup is only checked for presence and size; its
//! format is discovered by the restore step.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::CATALOG_COLUMNS;

/// Outcome of a catalog file check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogValidation {
    /// Whether the file is usable
    pub ok: bool,
    /// Why it is not (or the parse error message)
    pub detail: Option<String>,
    /// Data rows seen
    pub rows: usize,
    /// Empty cells per required column (tolerated, reported as a warning)
    pub null_counts: BTreeMap<String, usize>,
}

impl CatalogValidation {
    fn failed(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: Some(detail.into()),
            ..Default::default()
        }
    }
}

/// Check that a downloaded backup exists and is non-empty
///
/// Returns the file size.
pub fn validate_backup(path: &Path) -> Result<u64> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => {
            tracing::error!("Backup file not found: {}", path.display());
            return Err(Error::Validation(format!(
                "empty or missing backup: {} not found",
                path.display()
            )));
        }
    };

    if metadata.len() == 0 {
        tracing::error!("Backup file is empty: {}", path.display());
        return Err(Error::Validation(format!(
            "empty or missing backup: {} is empty",
            path.display()
        )));
    }

    tracing::info!("Backup file validated: {} ({} bytes)", path.display(), metadata.len());
    Ok(metadata.len())
}

/// Check a catalog file's columns and row count
///
/// Never returns an error: every failure, including a parse error, is reported
/// through `CatalogValidation::ok` and `detail`.
pub fn validate_catalog_file(path: &Path) -> CatalogValidation {
    match inspect_catalog(path) {
        Ok(validation) => {
            if let Some(detail) = &validation.detail {
                if validation.ok {
                    tracing::warn!("{}", detail);
                } else {
                    tracing::error!("{}", detail);
                }
            }
            if validation.ok {
                tracing::info!("Catalog validated: {} ({} rows)", path.display(), validation.rows);
            }
            validation
        }
        Err(e) => {
            let detail = format!("Catalog validation failed: {}", e);
            tracing::error!("{}", detail);
            CatalogValidation::failed(detail)
        }
    }
}

fn inspect_catalog(path: &Path) -> Result<CatalogValidation> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let positions: Vec<Option<usize>> = CATALOG_COLUMNS
        .iter()
        .map(|column| headers.iter().position(|h| h.trim() == *column))
        .collect();

    let missing: Vec<&str> = CATALOG_COLUMNS
        .iter()
        .zip(&positions)
        .filter(|(_, position)| position.is_none())
        .map(|(column, _)| *column)
        .collect();
    if !missing.is_empty() {
        return Ok(CatalogValidation::failed(format!(
            "Missing columns: {}",
            missing.join(", ")
        )));
    }

    let mut rows = 0usize;
    let mut null_counts: BTreeMap<String, usize> = BTreeMap::new();
    for record in reader.records() {
        let record = record?;
        rows += 1;
        for (column, position) in CATALOG_COLUMNS.iter().zip(&positions) {
            let empty = position
                .and_then(|i| record.get(i))
                .map_or(true, |value| value.trim().is_empty());
            if empty {
                *null_counts.entry((*column).to_string()).or_default() += 1;
            }
        }
    }

    if rows == 0 {
        return Ok(CatalogValidation::failed("catalog file is empty"));
    }

    let detail = (!null_counts.is_empty()).then(|| {
        let summary: Vec<String> = null_counts
            .iter()
            .map(|(column, count)| format!("{}={}", column, count))
            .collect();
        format!("Null values found: {}", summary.join(", "))
    });

    Ok(CatalogValidation {
        ok: true,
        detail,
        rows,
        null_counts,
    })
}
