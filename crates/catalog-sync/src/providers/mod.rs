//! Backup source abstraction
//!
//! The pipeline only sees the `BackupSource` trait, so the orchestrator can be driven
//! by Dropbox in production and by an in-memory fake in tests.

pub mod backup_source;
pub mod dropbox;

pub use backup_source::BackupSource;
pub use dropbox::{DropboxAuth, DropboxBackupSource};
