//! Dropbox folder client for listing and downloading backups

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use super::auth::DropboxAuth;
use crate::config::DropboxConfig;
use crate::error::{Error, Result};
use crate::providers::backup_source::BackupSource;
use crate::types::{BackupFile, LocalBackupArtifact};

/// Dropbox backup source
pub struct DropboxBackupSource {
    auth: DropboxAuth,
    client: Client,
    api_base_url: String,
    folder_path: String,
    backup_extension: String,
    request_timeout: Duration,
    download_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ListFolderResponse {
    #[serde(default)]
    entries: Vec<FolderEntry>,
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct FolderEntry {
    #[serde(rename = ".tag", default)]
    tag: Option<String>,
    name: String,
    #[serde(default)]
    path_display: Option<String>,
    #[serde(default)]
    path_lower: Option<String>,
    /// Absent on folder entries
    #[serde(default)]
    server_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct TemporaryLinkResponse {
    link: String,
}

impl DropboxBackupSource {
    /// Create a new Dropbox backup source
    pub fn new(config: &DropboxConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            auth: DropboxAuth::new(client.clone(), config),
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            folder_path: config.folder_path.clone(),
            backup_extension: config.backup_extension.clone(),
            request_timeout: config.request_timeout(),
            download_timeout: config.download_timeout(),
        })
    }

    fn endpoint(&self, route: &str) -> String {
        format!("{}/2/{}", self.api_base_url, route)
    }

    /// POST a JSON body to an RPC endpoint and decode the JSON reply
    async fn rpc<T: serde::de::DeserializeOwned>(
        &self,
        token: &str,
        route: &str,
        body: serde_json::Value,
    ) -> std::result::Result<T, String> {
        let response = self
            .client
            .post(self.endpoint(route))
            .bearer_auth(token)
            .json(&body)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| format!("{} request failed: {}", route, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{} returned {}: {}", route, status, body));
        }

        response
            .json()
            .await
            .map_err(|e| format!("Failed to parse {} response: {}", route, e))
    }

    fn is_backup(&self, entry: &FolderEntry) -> bool {
        entry.tag.as_deref().map_or(true, |tag| tag == "file")
            && entry.name.ends_with(&self.backup_extension)
    }

    async fn fetch_to(&self, url: &str, part_path: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|e| Error::Download(format!("Download request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Download(format!(
                "Download returned {}",
                response.status()
            )));
        }

        let expected = response.content_length();
        let write_failed =
            |e: std::io::Error| Error::Download(format!("Failed to write {}: {}", part_path.display(), e));
        let mut file = tokio::fs::File::create(part_path).await.map_err(write_failed)?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Download(format!("Download interrupted: {}", e)))?;
            file.write_all(&chunk).await.map_err(write_failed)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(write_failed)?;
        file.sync_all().await.map_err(write_failed)?;

        if let Some(expected) = expected {
            if written < expected {
                return Err(Error::Download(format!(
                    "Short download: wrote {} of {} bytes",
                    written, expected
                )));
            }
        }

        Ok(written)
    }
}

async fn remove_part(part: &Path) {
    if let Err(e) = tokio::fs::remove_file(part).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove partial download {}: {}", part.display(), e);
        }
    }
}

/// Sibling path the body is streamed into before the final rename
fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

#[async_trait]
impl BackupSource for DropboxBackupSource {
    async fn refresh_token(&self) -> Result<String> {
        self.auth.access_token().await
    }

    async fn list_backups(&self) -> Result<Vec<BackupFile>> {
        let token = self
            .auth
            .access_token()
            .await
            .map_err(|e| Error::RemoteList(e.to_string()))?;

        let mut page: ListFolderResponse = self
            .rpc(&token, "files/list_folder", json!({ "path": self.folder_path }))
            .await
            .map_err(Error::RemoteList)?;

        let mut files = Vec::new();
        loop {
            for entry in page.entries.drain(..) {
                if !self.is_backup(&entry) {
                    continue;
                }
                let Some(modified_at) = entry.server_modified else {
                    continue;
                };
                let remote_path = entry
                    .path_display
                    .or(entry.path_lower)
                    .unwrap_or_else(|| format!("{}/{}", self.folder_path, entry.name));
                files.push(BackupFile {
                    name: entry.name,
                    remote_path,
                    modified_at,
                });
            }

            match (page.has_more, page.cursor.take()) {
                (true, Some(cursor)) => {
                    page = self
                        .rpc(&token, "files/list_folder/continue", json!({ "cursor": cursor }))
                        .await
                        .map_err(Error::RemoteList)?;
                }
                _ => break,
            }
        }

        files.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        tracing::info!("Found {} backup files in {}", files.len(), self.folder_path);
        Ok(files)
    }

    async fn download_latest(&self, destination: &Path) -> Result<LocalBackupArtifact> {
        let latest = self
            .list_backups()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(self.folder_path.clone()))?;

        tracing::info!("Downloading latest backup: {} ({})", latest.name, latest.modified_at);

        let token = self
            .auth
            .access_token()
            .await
            .map_err(|e| Error::Download(e.to_string()))?;

        let link: TemporaryLinkResponse = self
            .rpc(&token, "files/get_temporary_link", json!({ "path": latest.remote_path }))
            .await
            .map_err(Error::Download)?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Download(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let part = part_path(destination);
        let size_bytes = match self.fetch_to(&link.link, &part).await {
            Ok(size) => size,
            Err(e) => {
                remove_part(&part).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&part, destination).await {
            remove_part(&part).await;
            return Err(Error::Download(format!(
                "Failed to move download to {}: {}",
                destination.display(),
                e
            )));
        }
        tracing::info!("Downloaded {} bytes to: {}", size_bytes, destination.display());

        Ok(LocalBackupArtifact {
            path: destination.to_path_buf(),
            size_bytes,
            source: latest,
        })
    }

    fn name(&self) -> &str {
        "dropbox"
    }
}
