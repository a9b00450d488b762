//! Core types shared by the pipeline stages and the catalog index

pub mod backup;
pub mod product;

pub use backup::{run_stamp, BackupFile, LocalBackupArtifact};
pub use product::{ProductRecord, CATALOG_COLUMNS, CATALOG_EXTENSION};
