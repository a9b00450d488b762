//! SQLite engine on a single database file
//!
//! The backup for this engine is a SQL text dump (`sqlite3 db .dump`). Export walks
//! the query cursor row by row into the CSV writer, so memory stays flat regardless
//! of catalog size.

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ExportSummary, RelationalStore, EXPORT_QUERY, ITEM_TABLE};
use crate::error::{Error, Result};
use crate::types::CATALOG_COLUMNS;

/// SQLite store
pub struct SqliteStore {
    path: Arc<PathBuf>,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
        }
    }

    /// Database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run blocking rusqlite work off the async runtime
    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T> + Send + 'static,
    {
        let path = Arc::clone(&self.path);
        tokio::task::spawn_blocking(move || work(&path))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }
}

/// Files SQLite may keep next to the database
fn sidecar_paths(path: &Path) -> Vec<PathBuf> {
    let mut paths = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut name = path.as_os_str().to_os_string();
        name.push(suffix);
        paths.push(PathBuf::from(name));
    }
    paths
}

/// Render one cell as plain CSV text (NULL becomes an empty cell)
fn cell_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    }
}

fn export_rows(db_path: &Path, output_path: &Path) -> Result<u64> {
    let conn = Connection::open(db_path)?;
    let mut stmt = conn.prepare(EXPORT_QUERY)?;
    let mut rows = stmt.query([])?;

    let mut writer = csv::Writer::from_path(output_path)?;
    writer.write_record(CATALOG_COLUMNS)?;

    let mut written = 0u64;
    let mut record = Vec::with_capacity(CATALOG_COLUMNS.len());
    while let Some(row) = rows.next()? {
        record.clear();
        for i in 0..CATALOG_COLUMNS.len() {
            record.push(cell_text(row.get_ref(i)?));
        }
        writer.write_record(&record)?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

#[async_trait]
impl RelationalStore for SqliteStore {
    async fn ensure_running(&self) -> bool {
        let reachable = self.path.parent().map_or(true, |dir| dir.as_os_str().is_empty() || dir.is_dir());
        if reachable {
            tracing::info!("SQLite database directory available: {}", self.path.display());
        } else {
            tracing::error!("SQLite database directory missing for {}", self.path.display());
        }
        reachable
    }

    async fn drop_database(&self) -> Result<()> {
        self.blocking(|path| {
            for file in sidecar_paths(path) {
                match std::fs::remove_file(&file) {
                    Ok(()) => tracing::debug!("Removed {}", file.display()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(Error::restore("drop database", e.to_string())),
                }
            }
            Ok(())
        })
        .await
    }

    async fn create_database(&self) -> Result<()> {
        self.blocking(|path| {
            Connection::open(path)
                .and_then(|conn| conn.execute_batch("PRAGMA journal_mode=DELETE;"))
                .map_err(|e| Error::restore("create database", e.to_string()))
        })
        .await
    }

    async fn restore_dump(&self, backup_path: &Path) -> Result<()> {
        let backup_path = backup_path.to_path_buf();
        self.blocking(move |path| {
            let dump = std::fs::read_to_string(&backup_path)
                .map_err(|e| Error::restore("restore dump", format!("{}: {}", backup_path.display(), e)))?;
            let conn = Connection::open(path)?;
            conn.execute_batch(&dump)
                .map_err(|e| Error::restore("restore dump", e.to_string()))
        })
        .await
    }

    async fn export(&self, output_path: &Path) -> Result<ExportSummary> {
        let output_path = output_path.to_path_buf();
        self.blocking(move |path| {
            if let Some(parent) = output_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            match export_rows(path, &output_path) {
                Ok(rows) => Ok(ExportSummary {
                    path: output_path,
                    rows,
                }),
                Err(e) => {
                    let _ = std::fs::remove_file(&output_path);
                    Err(Error::export(e.to_string()))
                }
            }
        })
        .await
    }

    async fn source_item_count(&self) -> Result<u64> {
        self.blocking(|path| {
            let conn = Connection::open(path)?;
            let count: i64 = conn.query_row(&format!("SELECT count(*) FROM {}", ITEM_TABLE), [], |row| {
                row.get(0)
            })?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
