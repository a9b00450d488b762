//! catalog-sync: point-of-sale backup sync pipeline and bot-side product catalog
//!
//! The sync side pulls the newest iPOS backup from Dropbox, restores it into a
//! relational database, exports the product/unit/price join as a CSV catalog and
//! prunes old catalogs. The catalog side keeps the newest catalog in memory and
//! answers the bot's `reload`, `version` and search commands.

pub mod catalog;
pub mod config;
pub mod error;
pub mod providers;
pub mod retention;
pub mod storage;
pub mod sync;
pub mod telemetry;
pub mod types;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use catalog::{CatalogIndex, CatalogResponder, CatalogSnapshot, SearchResults};
pub use config::SyncConfig;
pub use error::{Error, Result};
pub use providers::{BackupSource, DropboxBackupSource};
pub use storage::{store_from_config, RelationalStore};
pub use sync::{SyncOrchestrator, SyncOutcome, SyncStage};
pub use types::{BackupFile, LocalBackupArtifact, ProductRecord};
