//! Backup object metadata and the local copy a run downloads

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A backup object in the remote folder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupFile {
    /// Object name, e.g. `backup_2025-01-02.i5bu`
    pub name: String,
    /// Full remote path used to request a download link
    pub remote_path: String,
    /// Server-side modification time
    pub modified_at: DateTime<Utc>,
}

/// Backup downloaded to the backups directory
#[derive(Debug, Clone)]
pub struct LocalBackupArtifact {
    /// Where the backup was written
    pub path: PathBuf,
    /// Bytes written
    pub size_bytes: u64,
    /// Remote object it was fetched from
    pub source: BackupFile,
}

/// Timestamp used to name a run's backup and catalog files (`DDMMYYYY-HHMM`)
pub fn run_stamp(at: DateTime<Local>) -> String {
    at.format("%d%m%Y-%H%M").to_string()
}
