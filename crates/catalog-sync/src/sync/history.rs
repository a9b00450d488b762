//! Persisted outcome of recent sync runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Run history stored as JSON in the data directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunHistory {
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    /// Stage name of the last failure
    pub last_failed_stage: Option<String>,
    /// Catalog file produced by the last successful run
    pub last_catalog: Option<PathBuf>,
    pub consecutive_failures: u32,
}

impl RunHistory {
    /// Load history, starting fresh when the file is missing or unreadable
    pub fn load(path: &Path) -> Self {
        match std::fs::read(path) {
            Ok(body) => serde_json::from_slice(&body).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable run history {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                tracing::warn!("Failed to read run history {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write history atomically (temp file + rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp = path.as_os_str().to_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn record_success(&mut self, catalog: &Path) {
        self.last_success = Some(Utc::now());
        self.last_catalog = Some(catalog.to_path_buf());
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self, stage: &str) {
        self.last_failure = Some(Utc::now());
        self.last_failed_stage = Some(stage.to_string());
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    /// Whether the failure streak has reached the alert threshold
    pub fn should_alert(&self, threshold: u32) -> bool {
        threshold > 0 && self.consecutive_failures >= threshold
    }
}
