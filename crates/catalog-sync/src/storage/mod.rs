//! Relational store lifecycle: probe, drop/create/restore, and catalog export
//!
//! The orchestrator only talks to the `RelationalStore` trait. Engines:
//! - `PostgresStore`: PostgreSQL through its client tools (`pg_restore`, `psql`)
//! - `SqliteStore`: embedded SQLite file restored from a SQL dump

mod cycle;
mod postgres;
mod sqlite;

pub use cycle::{CyclePhase, RestoreCycle};
pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{DatabaseEngine, SyncConfig};
use crate::error::Result;

/// Fixed catalog query: item × item-unit × item-price-by-unit
pub const EXPORT_QUERY: &str = "
    SELECT i.namaitem, s.jumlahkonv AS konversi, s.satuan,
           s.hargapokok, h.hargajual
    FROM tbl_item i
    JOIN tbl_itemsatuanjml s ON i.kodeitem = s.kodeitem
    JOIN tbl_itemhj h ON i.kodeitem = h.kodeitem AND s.satuan = h.satuan
    ORDER BY i.namaitem, s.satuan
";

/// Table counted to tell an empty export from an empty source
pub const ITEM_TABLE: &str = "tbl_item";

/// Result of a catalog export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// Catalog file written
    pub path: PathBuf,
    /// Data rows written (header excluded)
    pub rows: u64,
}

/// Trait for the database a backup is restored into
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Probe whether the engine is reachable. Never starts it.
    async fn ensure_running(&self) -> bool;

    /// Drop the target database if it exists
    async fn drop_database(&self) -> Result<()>;

    /// Create an empty target database
    async fn create_database(&self) -> Result<()>;

    /// Load a backup dump into the (empty) target database
    async fn restore_dump(&self, backup_path: &Path) -> Result<()>;

    /// Drop, create, and restore in order; no rollback on failure
    async fn restore(&self, backup_path: &Path) -> Result<()> {
        RestoreCycle::new().restore(self, backup_path).await
    }

    /// Stream the catalog query result to `output_path` as CSV with a header row
    async fn export(&self, output_path: &Path) -> Result<ExportSummary>;

    /// Number of rows in the item master table
    async fn source_item_count(&self) -> Result<u64>;

    /// Get engine name for logging
    fn name(&self) -> &str;
}

/// Build the configured engine
pub fn store_from_config(config: &SyncConfig) -> Arc<dyn RelationalStore> {
    match config.database.engine {
        DatabaseEngine::Postgres => Arc::new(PostgresStore::new(config.database.clone())),
        DatabaseEngine::Sqlite => Arc::new(SqliteStore::new(
            config.paths.resolve(&config.database.sqlite_path),
        )),
    }
}

/// Query collapsed onto one line (psql meta-commands end at a newline)
pub(crate) fn single_line_query() -> String {
    EXPORT_QUERY.split_whitespace().collect::<Vec<_>>().join(" ")
}
