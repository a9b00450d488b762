//! In-memory catalog with copy-on-write reload
//!
//! A reload parses the newest catalog file into a fresh `CatalogSnapshot` and only
//! then swaps it in. Searches clone the current `Arc` and drop the lock right away,
//! so a search during a reload sees either the old or the new snapshot in full.

use chrono::{DateTime, Local};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::retention::{list_catalog_files, FileEntry};
use crate::types::{ProductRecord, CATALOG_COLUMNS};

/// One fully parsed catalog file
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    /// Rows in file order
    pub records: Vec<ProductRecord>,
    /// File the snapshot was read from
    pub source_path: PathBuf,
    /// Modification time of that file (the data version)
    pub file_modified_at: DateTime<Local>,
    /// When the snapshot was built
    pub loaded_at: DateTime<Local>,
    /// Rows dropped for empty required cells
    pub skipped_rows: usize,
}

/// Search outcome
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    /// Matches sorted by name, at most the configured limit
    pub records: Vec<ProductRecord>,
    /// Matches before the limit was applied
    pub total_matches: usize,
    /// Whether the limit cut the result
    pub truncated: bool,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Catalog index served to the bot
pub struct CatalogIndex {
    exports_dir: PathBuf,
    search_limit: usize,
    current: RwLock<Option<Arc<CatalogSnapshot>>>,
}

impl CatalogIndex {
    /// Create an empty index over an export directory
    pub fn new(exports_dir: impl Into<PathBuf>, search_limit: usize) -> Self {
        Self {
            exports_dir: exports_dir.into(),
            search_limit: search_limit.max(1),
            current: RwLock::new(None),
        }
    }

    pub fn exports_dir(&self) -> &Path {
        &self.exports_dir
    }

    pub fn search_limit(&self) -> usize {
        self.search_limit
    }

    /// Current snapshot, if a reload ever succeeded
    pub fn snapshot(&self) -> Option<Arc<CatalogSnapshot>> {
        self.current.read().clone()
    }

    /// Load the newest catalog file and swap it in
    ///
    /// On any error the previous snapshot stays active.
    pub fn reload(&self) -> Result<Arc<CatalogSnapshot>> {
        let candidates = list_catalog_files(&self.exports_dir)?;
        self.reload_from(candidates)
    }

    /// Swap in the first candidate that still exists, newest first
    fn reload_from(&self, candidates: Vec<FileEntry>) -> Result<Arc<CatalogSnapshot>> {
        if candidates.is_empty() {
            return Err(Error::NoCatalogFound(self.exports_dir.display().to_string()));
        }

        for candidate in candidates {
            match load_snapshot(&candidate.path) {
                Ok(snapshot) => {
                    let snapshot = Arc::new(snapshot);
                    *self.current.write() = Some(Arc::clone(&snapshot));
                    tracing::info!(
                        "Reloaded catalog: {} ({} records, {} skipped)",
                        snapshot.source_path.display(),
                        snapshot.records.len(),
                        snapshot.skipped_rows
                    );
                    return Ok(snapshot);
                }
                Err(e @ Error::FileVanished(_)) => {
                    tracing::warn!("{}; trying the next most recent file", e);
                }
                Err(e) => {
                    tracing::error!("Catalog reload failed, keeping previous snapshot: {}", e);
                    return Err(e);
                }
            }
        }

        Err(Error::NoCatalogFound(self.exports_dir.display().to_string()))
    }

    /// Case-insensitive substring search on product names
    pub fn search(&self, query: &str) -> Result<SearchResults> {
        let snapshot = self
            .snapshot()
            .ok_or_else(|| Error::NoCatalogFound(self.exports_dir.display().to_string()))?;

        let needle = query.trim().to_lowercase();
        let mut matches: Vec<&ProductRecord> = snapshot
            .records
            .iter()
            .filter(|record| record.name.to_lowercase().contains(&needle))
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));

        let total_matches = matches.len();
        Ok(SearchResults {
            records: matches.into_iter().take(self.search_limit).cloned().collect(),
            total_matches,
            truncated: total_matches > self.search_limit,
        })
    }

    /// Modification time of the loaded file, `None` before the first reload
    pub fn version(&self) -> Option<DateTime<Local>> {
        self.current.read().as_ref().map(|s| s.file_modified_at)
    }
}

fn vanished_or(path: &Path, e: Error) -> Error {
    if e.is_not_found() {
        Error::FileVanished(path.display().to_string())
    } else {
        Error::parse(path.display().to_string(), e.to_string())
    }
}

/// Parse a catalog file into a snapshot
fn load_snapshot(path: &Path) -> Result<CatalogSnapshot> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| vanished_or(path, e.into()))?;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| vanished_or(path, e.into()))?;

    let headers = reader
        .headers()
        .map_err(|e| Error::parse(path.display().to_string(), e.to_string()))?
        .clone();
    let positions: Vec<Option<usize>> = CATALOG_COLUMNS
        .iter()
        .map(|column| headers.iter().position(|h| h == *column))
        .collect();
    let missing: Vec<&str> = CATALOG_COLUMNS
        .iter()
        .zip(&positions)
        .filter(|(_, p)| p.is_none())
        .map(|(c, _)| *c)
        .collect();
    if !missing.is_empty() {
        return Err(Error::parse(
            path.display().to_string(),
            format!("Missing columns: {}", missing.join(", ")),
        ));
    }

    let mut records = Vec::new();
    let mut skipped_rows = 0usize;
    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(|e| Error::parse(path.display().to_string(), e.to_string()))?;
        let has_null = positions
            .iter()
            .flatten()
            .any(|&i| row.get(i).map_or(true, str::is_empty));
        if has_null {
            skipped_rows += 1;
            continue;
        }
        let record: ProductRecord = row.deserialize(Some(&headers)).map_err(|e| {
            Error::parse(
                path.display().to_string(),
                format!("row {}: {}", line + 1, e),
            )
        })?;
        records.push(record);
    }

    if skipped_rows > 0 {
        tracing::warn!(
            "Skipped {} catalog rows with empty required fields in {}",
            skipped_rows,
            path.display()
        );
    }

    Ok(CatalogSnapshot {
        records,
        source_path: path.to_path_buf(),
        file_modified_at: DateTime::<Local>::from(modified),
        loaded_at: Local::now(),
        skipped_rows,
    })
}
