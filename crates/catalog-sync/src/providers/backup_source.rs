//! Backup source provider trait for remote backup folders

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;
use crate::types::{BackupFile, LocalBackupArtifact};

/// Trait for remote backup storage
///
/// Implementations:
/// - `DropboxBackupSource`: Dropbox folder with refresh-token credentials
#[async_trait]
pub trait BackupSource: Send + Sync {
    /// Exchange the stored refresh token for a short-lived bearer token
    async fn refresh_token(&self) -> Result<String>;

    /// List backup objects, most recently modified first
    async fn list_backups(&self) -> Result<Vec<BackupFile>>;

    /// Download the most recent backup to `destination`
    ///
    /// Writes nothing when the folder is empty, and leaves no partial file behind
    /// on failure.
    async fn download_latest(&self, destination: &Path) -> Result<LocalBackupArtifact>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
