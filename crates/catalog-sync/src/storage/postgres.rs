//! PostgreSQL engine driven through its client tools
//!
//! Supports:
//! - pg_isready - reachability probe
//! - dropdb / createdb - target database lifecycle
//! - pg_restore - custom-format dump restore
//! - psql `\copy` - server-side query streamed straight to the catalog file

use async_trait::async_trait;
use std::path::Path;
use std::process::Output;
use tokio::process::Command;

use super::{single_line_query, ExportSummary, RelationalStore, ITEM_TABLE};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};

/// PostgreSQL store
pub struct PostgresStore {
    config: DatabaseConfig,
}

impl PostgresStore {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    /// Client tool invocation with connection flags and credentials
    fn command(&self, program: &str) -> Command {
        let mut cmd = Command::new(program);
        cmd.arg("-h")
            .arg(&self.config.host)
            .arg("-p")
            .arg(self.config.port.to_string())
            .arg("-U")
            .arg(&self.config.user)
            .env("PGPASSWORD", &self.config.password)
            .env("PGCONNECT_TIMEOUT", self.connect_timeout_arg())
            .kill_on_drop(true);
        cmd
    }

    /// Whole seconds; libpq and pg_isready both read 0 as "wait forever"
    fn connect_timeout_arg(&self) -> String {
        self.config.connect_timeout().as_secs().max(1).to_string()
    }

    /// Run a command to completion under the per-command timeout
    async fn run(&self, what: &str, mut cmd: Command) -> std::result::Result<Output, String> {
        let timeout = self.config.command_timeout();
        match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(format!("Failed to spawn {}: {}", what, e)),
            Err(_) => Err(format!("{} timed out after {}s", what, timeout.as_secs())),
        }
    }

    async fn run_checked(&self, what: &str, cmd: Command) -> std::result::Result<Output, String> {
        let output = self.run(what, cmd).await?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(format!(
                "{} exited with {}: {}",
                what,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }
}

/// `pg_restore` exits non-zero for warnings it skipped past
fn restore_errors_ignored(stderr: &str) -> bool {
    stderr.to_lowercase().contains("errors ignored on restore")
}

/// Row count from psql's `COPY n` status line
fn parse_copy_count(stdout: &str) -> Option<u64> {
    stdout
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix("COPY "))
        .and_then(|count| count.trim().parse().ok())
}

/// `\copy` meta-command writing the query result as CSV with a header
fn copy_command(query: &str, output_path: &Path) -> String {
    let target = output_path.to_string_lossy().replace('\'', "''");
    format!("\\copy ({}) TO '{}' WITH (FORMAT csv, HEADER)", query, target)
}

/// Data rows in a written CSV file (fallback when psql prints no count)
fn count_csv_rows(path: &Path) -> Result<u64> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = 0u64;
    for record in reader.records() {
        record?;
        rows += 1;
    }
    Ok(rows)
}

#[async_trait]
impl RelationalStore for PostgresStore {
    async fn ensure_running(&self) -> bool {
        let mut cmd = self.command("pg_isready");
        cmd.arg("-d")
            .arg(&self.config.name)
            .arg("-t")
            .arg(self.connect_timeout_arg());

        match self.run("pg_isready", cmd).await {
            Ok(output) if output.status.success() => {
                tracing::info!("Database connection successful ({}:{})", self.config.host, self.config.port);
                true
            }
            Ok(output) => {
                tracing::error!(
                    "Database not accepting connections at {}:{}: {}",
                    self.config.host,
                    self.config.port,
                    String::from_utf8_lossy(&output.stdout).trim()
                );
                false
            }
            Err(e) => {
                tracing::error!("Database probe failed: {}", e);
                false
            }
        }
    }

    async fn drop_database(&self) -> Result<()> {
        let mut cmd = self.command("dropdb");
        cmd.arg("--if-exists").arg(&self.config.name);
        self.run_checked("dropdb", cmd)
            .await
            .map(|_| ())
            .map_err(|e| Error::restore("drop database", e))
    }

    async fn create_database(&self) -> Result<()> {
        let mut cmd = self.command("createdb");
        cmd.arg(&self.config.name);
        self.run_checked("createdb", cmd)
            .await
            .map(|_| ())
            .map_err(|e| Error::restore("create database", e))
    }

    async fn restore_dump(&self, backup_path: &Path) -> Result<()> {
        let mut cmd = self.command("pg_restore");
        cmd.arg("-d")
            .arg(&self.config.name)
            .args(["--no-owner", "--no-privileges", "--disable-triggers"])
            .arg(backup_path);

        let output = self
            .run("pg_restore", cmd)
            .await
            .map_err(|e| Error::restore("restore dump", e))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if restore_errors_ignored(&stderr) {
            tracing::warn!("Restore completed with ignored errors: {}", stderr.trim());
            Ok(())
        } else {
            Err(Error::restore(
                "restore dump",
                format!("pg_restore exited with {}: {}", output.status, stderr.trim()),
            ))
        }
    }

    async fn export(&self, output_path: &Path) -> Result<ExportSummary> {
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut cmd = self.command("psql");
        cmd.arg("-d")
            .arg(&self.config.name)
            .args(["-X", "-v", "ON_ERROR_STOP=1", "-c"])
            .arg(copy_command(&single_line_query(), output_path));

        let output = match self.run_checked("psql \\copy", cmd).await {
            Ok(output) => output,
            Err(e) => {
                let _ = tokio::fs::remove_file(output_path).await;
                return Err(Error::export(e));
            }
        };

        let rows = match parse_copy_count(&String::from_utf8_lossy(&output.stdout)) {
            Some(rows) => rows,
            None => count_csv_rows(output_path)?,
        };

        Ok(ExportSummary {
            path: output_path.to_path_buf(),
            rows,
        })
    }

    async fn source_item_count(&self) -> Result<u64> {
        let mut cmd = self.command("psql");
        cmd.arg("-d")
            .arg(&self.config.name)
            .args(["-X", "-A", "-t", "-c"])
            .arg(format!("SELECT count(*) FROM {}", ITEM_TABLE));

        let output = self.run_checked("psql count", cmd).await.map_err(Error::Internal)?;
        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse()
            .map_err(|e| Error::internal(format!("Unexpected count output: {}", e)))
    }

    fn name(&self) -> &str {
        "postgres"
    }
}
