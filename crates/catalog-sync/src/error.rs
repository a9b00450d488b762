//! Error types for the sync pipeline and the catalog consumer

use thiserror::Error;

/// Result type alias for catalog-sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Catalog sync errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token exchange with the storage provider failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Listing the remote backup folder failed
    #[error("Failed to list backups: {0}")]
    RemoteList(String),

    /// Fetching a backup object failed
    #[error("Failed to download backup: {0}")]
    Download(String),

    /// No backup object in the remote folder
    #[error("No backup files found in {0}")]
    NotFound(String),

    /// Artifact failed a structural check
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Database engine not reachable
    #[error("Database unavailable: {0}")]
    StoreUnavailable(String),

    /// One of the drop/create/restore sub-steps failed
    #[error("Database restore failed during {step}: {message}")]
    Restore { step: String, message: String },

    /// Catalog export query failed
    #[error("Catalog export failed: {0}")]
    Export(String),

    /// Export directory holds no catalog file
    #[error("No catalog file found in {0}")]
    NoCatalogFound(String),

    /// Catalog file could not be parsed
    #[error("Failed to parse catalog '{path}': {message}")]
    Parse { path: String, message: String },

    /// Catalog file disappeared between listing and reading
    #[error("Catalog file vanished: {0}")]
    FileVanished(String),

    /// Another sync run holds the lock
    #[error("Another sync run is in progress (lock held by {0})")]
    AlreadyRunning(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a restore error for the given sub-step
    pub fn restore(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Restore {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Create a catalog parse error
    pub fn parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an export error
    pub fn export(message: impl Into<String>) -> Self {
        Self::Export(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the error means a file was not found on disk
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
            || matches!(self, Error::Csv(e) if matches!(e.kind(), csv::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::NotFound))
    }
}
