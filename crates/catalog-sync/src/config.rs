//! Configuration for the sync pipeline and the catalog index

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Dropbox backup source
    #[serde(default)]
    pub dropbox: DropboxConfig,
    /// Target database
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Data and log directories
    #[serde(default)]
    pub paths: PathsConfig,
    /// Catalog file retention
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Catalog index settings
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Run guard and alerting
    #[serde(default)]
    pub sync: RunConfig,
}

impl SyncConfig {
    /// Load configuration from an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse TOML configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, target: &mut String| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *target = value;
            }
        };

        text("DROPBOX_APP_KEY", &mut self.dropbox.app_key);
        text("DROPBOX_APP_SECRET", &mut self.dropbox.app_secret);
        text("DROPBOX_REFRESH_TOKEN", &mut self.dropbox.refresh_token);
        text("DROPBOX_FOLDER_PATH", &mut self.dropbox.folder_path);
        text("DB_HOST", &mut self.database.host);
        text("DB_NAME", &mut self.database.name);
        text("DB_USER", &mut self.database.user);
        text("DB_PASSWORD", &mut self.database.password);

        if let Some(engine) = lookup("DB_ENGINE") {
            match engine.to_lowercase().as_str() {
                "postgres" | "postgresql" => self.database.engine = DatabaseEngine::Postgres,
                "sqlite" => self.database.engine = DatabaseEngine::Sqlite,
                other => tracing::warn!("Ignoring unknown DB_ENGINE '{}'", other),
            }
        }
        if let Some(port) = lookup("DB_PORT").and_then(|v| v.parse().ok()) {
            self.database.port = port;
        }
        if let Some(dir) = lookup("DATA_DIR").filter(|v| !v.is_empty()) {
            self.paths.data_dir = PathBuf::from(dir);
        }
        if let Some(keep) = lookup("MAX_CSV_FILES").and_then(|v| v.parse().ok()) {
            self.retention.max_csv_files = keep;
        }
        if let Some(keep) = lookup("MAX_BACKUP_FILES").and_then(|v| v.parse().ok()) {
            self.retention.max_backup_files = keep;
        }
        if let Some(limit) = lookup("SEARCH_RESULTS_LIMIT").and_then(|v| v.parse().ok()) {
            self.catalog.search_results_limit = limit;
        }
    }

    /// Check the values a sync run depends on
    pub fn validate(&self) -> Result<()> {
        if self.retention.max_csv_files == 0 {
            return Err(Error::Config("retention.max_csv_files must be at least 1".to_string()));
        }
        if self.retention.max_backup_files == 0 {
            return Err(Error::Config(
                "retention.max_backup_files must be at least 1".to_string(),
            ));
        }
        if self.catalog.search_results_limit == 0 {
            return Err(Error::Config(
                "catalog.search_results_limit must be at least 1".to_string(),
            ));
        }
        if !self.dropbox.backup_extension.starts_with('.') {
            return Err(Error::Config(format!(
                "dropbox.backup_extension must start with '.': {}",
                self.dropbox.backup_extension
            )));
        }
        Ok(())
    }

    /// Check that Dropbox credentials are present
    pub fn require_credentials(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("DROPBOX_APP_KEY", &self.dropbox.app_key),
            ("DROPBOX_APP_SECRET", &self.dropbox.app_secret),
            ("DROPBOX_REFRESH_TOKEN", &self.dropbox.refresh_token),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(key, _)| key)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!("Missing credentials: {}", missing.join(", "))))
        }
    }

    /// Copy with secrets masked, for printing
    pub fn redacted(&self) -> Self {
        let mask = |s: &str| if s.is_empty() { String::new() } else { "***".to_string() };
        let mut copy = self.clone();
        copy.dropbox.app_secret = mask(&self.dropbox.app_secret);
        copy.dropbox.refresh_token = mask(&self.dropbox.refresh_token);
        copy.database.password = mask(&self.database.password);
        copy
    }
}

/// Dropbox API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DropboxConfig {
    /// App key (HTTP basic auth user for token refresh)
    pub app_key: String,
    /// App secret
    pub app_secret: String,
    /// Long-lived refresh token
    pub refresh_token: String,
    /// Folder holding the backups
    pub folder_path: String,
    /// Extension of backup objects
    pub backup_extension: String,
    /// RPC endpoint base
    pub api_base_url: String,
    /// OAuth2 token endpoint
    pub token_url: String,
    /// Timeout for token refresh and API calls
    pub request_timeout_secs: u64,
    /// Timeout for the backup body download
    pub download_timeout_secs: u64,
}

impl Default for DropboxConfig {
    fn default() -> Self {
        Self {
            app_key: String::new(),
            app_secret: String::new(),
            refresh_token: String::new(),
            folder_path: "/IPOS".to_string(),
            backup_extension: ".i5bu".to_string(),
            api_base_url: "https://api.dropboxapi.com".to_string(),
            token_url: "https://api.dropboxapi.com/oauth2/token".to_string(),
            request_timeout_secs: 30,
            download_timeout_secs: 300,
        }
    }
}

impl DropboxConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// Database engine selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    /// PostgreSQL via its client tools
    #[default]
    Postgres,
    /// Embedded SQLite file
    Sqlite,
}

/// Target database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub engine: DatabaseEngine,
    pub host: String,
    pub port: u16,
    /// Database that gets dropped and restored on every run
    pub name: String,
    pub user: String,
    pub password: String,
    /// Database file for the sqlite engine (relative paths resolve against the data dir)
    pub sqlite_path: PathBuf,
    /// Reachability probe timeout
    pub connect_timeout_secs: u64,
    /// Timeout for each administrative command (drop, create, restore, export)
    pub command_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine: DatabaseEngine::Postgres,
            host: "localhost".to_string(),
            port: 5432,
            name: "i5bu".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            sqlite_path: PathBuf::from("i5bu.sqlite"),
            connect_timeout_secs: 5,
            command_timeout_secs: 600,
        }
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Filesystem layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root for backups, exports, and run state
    pub data_dir: PathBuf,
    /// Directory for app.log
    pub logs_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            logs_dir: PathBuf::from("logs"),
        }
    }
}

impl PathsConfig {
    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.data_dir.join("sync.lock")
    }

    pub fn history_file(&self) -> PathBuf {
        self.data_dir.join("sync_history.json")
    }

    /// Resolve a path relative to the data dir
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }
}

/// Catalog and backup file retention
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Number of most recent catalog files kept on disk
    pub max_csv_files: usize,
    /// Number of most recent downloaded backups kept on disk
    pub max_backup_files: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_csv_files: 5,
            max_backup_files: 2,
        }
    }
}

/// Catalog index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Maximum number of records returned by one search
    pub search_results_limit: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            search_results_limit: 10,
        }
    }
}

/// Run guard and alerting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Age after which a leftover lock file is taken over (default: 6 hours)
    pub stale_lock_secs: u64,
    /// Consecutive failed runs before an operator alert is logged
    pub alert_after_failures: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            stale_lock_secs: 6 * 60 * 60,
            alert_after_failures: 2,
        }
    }
}

impl RunConfig {
    pub fn stale_lock_after(&self) -> Duration {
        Duration::from_secs(self.stale_lock_secs)
    }
}
