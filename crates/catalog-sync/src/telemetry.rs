//! Tracing setup: console plus an append-only `app.log`

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::Result;

/// Default filter when neither `RUST_LOG` nor `LOG_LEVEL` is set
pub const DEFAULT_FILTER: &str = "catalog_sync=info";

/// Log file name under the logs directory
pub const LOG_FILE: &str = "app.log";

/// Filter directives: `RUST_LOG`, else `LOG_LEVEL` applied to this crate, else the default
fn filter_directives(rust_log: Option<String>, log_level: Option<String>) -> String {
    match (rust_log, log_level) {
        (Some(directives), _) if !directives.trim().is_empty() => directives,
        (_, Some(level)) if !level.trim().is_empty() => {
            let level = match level.trim().to_lowercase().as_str() {
                "warning" => "warn".to_string(),
                "critical" | "fatal" => "error".to_string(),
                other => other.to_string(),
            };
            format!("catalog_sync={}", level)
        }
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Install the global subscriber. Returns the log file path.
pub fn init_tracing(logs_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(logs_dir)?;
    let log_path = logs_dir.join(LOG_FILE);
    let file = OpenOptions::new().create(true).append(true).open(&log_path)?;

    let directives = filter_directives(std::env::var("RUST_LOG").ok(), std::env::var("LOG_LEVEL").ok());
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
        .try_init()
        .map_err(|e| crate::error::Error::internal(format!("Tracing already initialized: {}", e)))?;

    Ok(log_path)
}
