//! Sequential sync run: download, validate, restore, export, validate, prune

use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::history::RunHistory;
use super::lock::RunLock;
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::providers::BackupSource;
use crate::retention;
use crate::storage::{RelationalStore, RestoreCycle};
use crate::types::run_stamp;
use crate::validation::{validate_backup, validate_catalog_file};

/// Pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Lock,
    Download,
    ValidateBackup,
    EnsureStore,
    Restore,
    Export,
    ValidateCatalog,
    Cleanup,
}

impl SyncStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStage::Lock => "lock",
            SyncStage::Download => "download",
            SyncStage::ValidateBackup => "validate backup",
            SyncStage::EnsureStore => "ensure store",
            SyncStage::Restore => "restore",
            SyncStage::Export => "export",
            SyncStage::ValidateCatalog => "validate catalog",
            SyncStage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub backup_path: PathBuf,
    pub backup_bytes: u64,
    /// Remote object the backup came from
    pub remote_name: String,
    pub catalog_path: PathBuf,
    pub rows: u64,
    /// Catalog files deleted by retention
    pub removed_files: Vec<PathBuf>,
    /// Downloaded backups deleted by retention
    pub removed_backups: Vec<PathBuf>,
    pub duration: Duration,
}

/// Result of one `run()`
#[derive(Debug)]
pub enum SyncOutcome {
    Succeeded { report: SyncReport },
    Failed { stage: SyncStage, error: Error },
    /// Another run holds the lock
    Locked { holder: String },
}

impl SyncOutcome {
    /// Process exit status for the scheduler
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncOutcome::Succeeded { .. } => 0,
            SyncOutcome::Failed { .. } => 1,
            SyncOutcome::Locked { .. } => 2,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Succeeded { .. })
    }
}

/// Runs the sync pipeline against one backup source and one database target
pub struct SyncOrchestrator {
    config: SyncConfig,
    source: Arc<dyn BackupSource>,
    store: Arc<dyn RelationalStore>,
}

fn at<T>(stage: SyncStage, result: Result<T>) -> std::result::Result<T, (SyncStage, Error)> {
    result.map_err(|e| (stage, e))
}

/// Staging name for an export; never matches the catalog extension
fn staging_path(catalog_path: &Path) -> PathBuf {
    let mut name = catalog_path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

fn discard(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed unpublished export {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove unpublished export {}: {}", path.display(), e),
    }
}

impl SyncOrchestrator {
    pub fn new(config: SyncConfig, source: Arc<dyn BackupSource>, store: Arc<dyn RelationalStore>) -> Self {
        Self { config, source, store }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Execute one run stamped with the current local time
    pub async fn run(&self) -> SyncOutcome {
        self.run_at(Local::now()).await
    }

    /// Execute one run with artifact names derived from `started_at`
    ///
    /// Never panics on stage failures; every error becomes a `SyncOutcome`.
    pub async fn run_at(&self, started_at: DateTime<Local>) -> SyncOutcome {
        let lock_path = self.config.paths.lock_file();
        let _lock = match RunLock::acquire(&lock_path, self.config.sync.stale_lock_after()) {
            Ok(lock) => lock,
            Err(Error::AlreadyRunning(holder)) => {
                tracing::warn!("Sync skipped, lock {} held by {}", lock_path.display(), holder);
                return SyncOutcome::Locked { holder };
            }
            Err(error) => {
                tracing::error!("❌ Sync failed at {}: {}", SyncStage::Lock, error);
                return SyncOutcome::Failed {
                    stage: SyncStage::Lock,
                    error,
                };
            }
        };

        tracing::info!(
            "Starting sync process (source: {}, store: {})",
            self.source.name(),
            self.store.name()
        );
        let timer = Instant::now();
        let history_path = self.config.paths.history_file();
        let mut history = RunHistory::load(&history_path);

        let outcome = match self.stages(started_at, timer).await {
            Ok(report) => {
                tracing::info!(
                    "✅ Sync completed successfully: {} ({} rows, {:.1}s)",
                    report.catalog_path.display(),
                    report.rows,
                    report.duration.as_secs_f64()
                );
                history.record_success(&report.catalog_path);
                SyncOutcome::Succeeded { report }
            }
            Err((stage, error)) => {
                tracing::error!("❌ Sync failed at {}: {}", stage, error);
                history.record_failure(stage.as_str());
                if history.should_alert(self.config.sync.alert_after_failures) {
                    tracing::error!(
                        "ALERT: {} consecutive sync failures; catalog is stale (last good: {})",
                        history.consecutive_failures,
                        history
                            .last_catalog
                            .as_ref()
                            .map(|p| p.display().to_string())
                            .unwrap_or_else(|| "none".to_string())
                    );
                }
                SyncOutcome::Failed { stage, error }
            }
        };

        if let Err(e) = history.save(&history_path) {
            tracing::warn!("Failed to write run history {}: {}", history_path.display(), e);
        }
        outcome
    }

    async fn stages(
        &self,
        started_at: DateTime<Local>,
        timer: Instant,
    ) -> std::result::Result<SyncReport, (SyncStage, Error)> {
        let stamp = run_stamp(started_at);
        let paths = &self.config.paths;
        let backup_path = paths
            .backups_dir()
            .join(format!("backup_{}{}", stamp, self.config.dropbox.backup_extension));
        let catalog_path = paths.exports_dir().join(format!("{}.csv", stamp));

        tracing::info!("Step 1: Downloading backup from {}", self.source.name());
        let artifact = at(SyncStage::Download, self.source.download_latest(&backup_path).await)?;
        tracing::info!(
            "Downloaded {} -> {}",
            artifact.source.remote_path,
            artifact.path.display()
        );

        tracing::info!("Step 2: Validating backup file");
        let backup_bytes = at(SyncStage::ValidateBackup, validate_backup(&artifact.path))?;

        tracing::info!("Step 3: Restoring database");
        if !self.store.ensure_running().await {
            return Err((
                SyncStage::EnsureStore,
                Error::StoreUnavailable(format!("{} is not reachable", self.store.name())),
            ));
        }
        let mut cycle = RestoreCycle::new();
        at(
            SyncStage::Restore,
            cycle.restore(self.store.as_ref(), &artifact.path).await,
        )?;

        // Readers only ever see validated catalogs
        let staged = staging_path(&catalog_path);

        tracing::info!("Step 4: Exporting to CSV");
        let summary = match cycle.export(self.store.as_ref(), &staged).await {
            Ok(summary) => summary,
            Err(e) => {
                discard(&staged);
                return Err((SyncStage::Export, e));
            }
        };

        tracing::info!("Step 5: Validating CSV");
        let validation = validate_catalog_file(&summary.path);
        if !validation.ok {
            discard(&summary.path);
            let detail = validation.detail.unwrap_or_else(|| "unknown".to_string());
            return Err((
                SyncStage::ValidateCatalog,
                Error::Validation(format!("CSV validation failed: {}", detail)),
            ));
        }
        if let Err(e) = std::fs::rename(&summary.path, &catalog_path) {
            discard(&summary.path);
            return Err((
                SyncStage::ValidateCatalog,
                Error::export(format!(
                    "Failed to publish {}: {}",
                    catalog_path.display(),
                    e
                )),
            ));
        }
        tracing::info!("Published catalog: {}", catalog_path.display());

        tracing::info!("Step 6: Cleaning up old files");
        let keep = &self.config.retention;
        let removed_files = at(
            SyncStage::Cleanup,
            retention::cleanup(&paths.exports_dir(), keep.max_csv_files),
        )?;
        let removed_backups = at(
            SyncStage::Cleanup,
            retention::prune(
                &paths.backups_dir(),
                &self.config.dropbox.backup_extension,
                keep.max_backup_files,
            ),
        )?;

        Ok(SyncReport {
            backup_path: artifact.path,
            backup_bytes,
            remote_name: artifact.source.name,
            catalog_path,
            rows: summary.rows,
            removed_files,
            removed_backups,
            duration: timer.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogIndex;
    use crate::storage::{ExportSummary, SqliteStore};
    use crate::test_support::{write_catalog, SEED_DUMP};
    use crate::types::{BackupFile, LocalBackupArtifact};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves a fixed dump, or fails listing when `dump` is `None`
    struct FakeSource {
        dump: Option<&'static str>,
    }

    #[async_trait]
    impl BackupSource for FakeSource {
        async fn refresh_token(&self) -> Result<String> {
            Ok("token".to_string())
        }

        async fn list_backups(&self) -> Result<Vec<BackupFile>> {
            match self.dump {
                Some(_) => Ok(vec![BackupFile {
                    name: "pos.i5bu".to_string(),
                    remote_path: "/IPOS/pos.i5bu".to_string(),
                    modified_at: Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap(),
                }]),
                None => Err(Error::RemoteList("folder unavailable".to_string())),
            }
        }

        async fn download_latest(&self, destination: &Path) -> Result<LocalBackupArtifact> {
            let source = self
                .list_backups()
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| Error::NotFound("/IPOS".to_string()))?;
            std::fs::create_dir_all(destination.parent().unwrap())?;
            std::fs::write(destination, self.dump.unwrap_or_default())?;
            Ok(LocalBackupArtifact {
                path: destination.to_path_buf(),
                size_bytes: self.dump.unwrap_or_default().len() as u64,
                source,
            })
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    /// Store that reports itself unreachable and counts restore attempts
    #[derive(Default)]
    struct DownStore {
        restores: AtomicUsize,
    }

    #[async_trait]
    impl RelationalStore for DownStore {
        async fn ensure_running(&self) -> bool {
            false
        }
        async fn drop_database(&self) -> Result<()> {
            self.restores.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn create_database(&self) -> Result<()> {
            Ok(())
        }
        async fn restore_dump(&self, _backup_path: &Path) -> Result<()> {
            Ok(())
        }
        async fn export(&self, output_path: &Path) -> Result<ExportSummary> {
            Ok(ExportSummary {
                path: output_path.to_path_buf(),
                rows: 0,
            })
        }
        async fn source_item_count(&self) -> Result<u64> {
            Ok(0)
        }
        fn name(&self) -> &str {
            "down"
        }
    }

    fn test_config(dir: &Path) -> SyncConfig {
        let mut config = SyncConfig::default();
        config.paths.data_dir = dir.join("data");
        config.paths.logs_dir = dir.join("logs");
        config
    }

    fn sqlite_orchestrator(dir: &Path, dump: Option<&'static str>) -> SyncOrchestrator {
        let config = test_config(dir);
        let store = SqliteStore::new(config.paths.data_dir.join("i5bu.sqlite"));
        std::fs::create_dir_all(&config.paths.data_dir).unwrap();
        SyncOrchestrator::new(config, Arc::new(FakeSource { dump }), Arc::new(store))
    }

    fn stamp(minute: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 1, 1, 8, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_seed_export_reload_search() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = sqlite_orchestrator(dir.path(), Some(SEED_DUMP));

        let outcome = orchestrator.run_at(stamp(0)).await;
        assert_eq!(outcome.exit_code(), 0);
        let SyncOutcome::Succeeded { report } = outcome else {
            panic!("sync failed");
        };
        assert_eq!(report.rows, 2);
        assert!(report.catalog_path.ends_with("01012025-0800.csv"));
        assert!(report.backup_path.ends_with("backup_01012025-0800.i5bu"));
        assert!(report.removed_files.is_empty());
        assert_eq!(export_dir_names(&orchestrator), vec!["01012025-0800.csv"]);

        let index = CatalogIndex::new(orchestrator.config().paths.exports_dir(), 10);
        index.reload().unwrap();

        let all = index.search("").unwrap();
        let units: Vec<&str> = all.records.iter().map(|r| r.unit.as_str()).collect();
        assert_eq!(all.records.len(), 2);
        assert!(all.records.iter().all(|r| r.name == "BERAS PREMIUM"));
        assert_eq!(units, vec!["KG", "PACK"]);
        assert_eq!(all.records[0].cost_price, 12000.0);
        assert_eq!(all.records[0].sell_price, 15000.0);
        assert_eq!(all.records[1].conversion_factor, 5.0);
        assert_eq!(all.records[1].cost_price, 2000.0);
        assert_eq!(all.records[1].sell_price, 2500.0);

        assert!(index.search("nonexistent").unwrap().is_empty());
        assert!(!orchestrator.config().paths.lock_file().exists());
    }

    #[tokio::test]
    async fn test_retention_applied_after_export() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = sqlite_orchestrator(dir.path(), Some(SEED_DUMP));
        let exports = orchestrator.config().paths.exports_dir();
        std::fs::create_dir_all(&exports).unwrap();
        for i in 0..6 {
            write_catalog(&exports, &format!("old_{}.csv", i), &["X,1,PCS,1,2"], 3600 + i * 60);
        }

        let SyncOutcome::Succeeded { report } = orchestrator.run_at(stamp(30)).await else {
            panic!("sync failed");
        };

        assert_eq!(report.removed_files.len(), 2);
        let left = retention::list_catalog_files(&exports).unwrap();
        assert_eq!(left.len(), 5);
        assert_eq!(left[0].path, report.catalog_path);
    }

    #[tokio::test]
    async fn test_download_failure_stops_run() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = sqlite_orchestrator(dir.path(), None);

        let outcome = orchestrator.run_at(stamp(0)).await;

        assert_eq!(outcome.exit_code(), 1);
        assert!(matches!(
            outcome,
            SyncOutcome::Failed { stage: SyncStage::Download, error: Error::RemoteList(_) }
        ));
        assert!(retention::list_catalog_files(&orchestrator.config().paths.exports_dir())
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_empty_backup_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = sqlite_orchestrator(dir.path(), Some(""));

        let outcome = orchestrator.run_at(stamp(0)).await;

        assert!(matches!(
            outcome,
            SyncOutcome::Failed { stage: SyncStage::ValidateBackup, error: Error::Validation(_) }
        ));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DownStore::default());
        let orchestrator = SyncOrchestrator::new(
            test_config(dir.path()),
            Arc::new(FakeSource { dump: Some(SEED_DUMP) }),
            store.clone(),
        );

        let outcome = orchestrator.run_at(stamp(0)).await;

        assert!(matches!(
            outcome,
            SyncOutcome::Failed { stage: SyncStage::EnsureStore, error: Error::StoreUnavailable(_) }
        ));
        assert_eq!(store.restores.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_corrupt_backup_fails_restore_and_keeps_catalogs() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = sqlite_orchestrator(dir.path(), Some("not a dump"));
        let exports = orchestrator.config().paths.exports_dir();
        std::fs::create_dir_all(&exports).unwrap();
        for i in 0..7 {
            write_catalog(&exports, &format!("old_{}.csv", i), &["X,1,PCS,1,2"], i * 60);
        }

        let outcome = orchestrator.run_at(stamp(0)).await;

        assert!(matches!(
            outcome,
            SyncOutcome::Failed { stage: SyncStage::Restore, error: Error::Restore { .. } }
        ));
        assert_eq!(retention::list_catalog_files(&exports).unwrap().len(), 7);
    }

    /// Seed dump without rows: restores fine, exports an empty catalog
    fn schema_only_dump() -> &'static str {
        Box::leak(
            SEED_DUMP
                .lines()
                .filter(|line| !line.trim_start().starts_with("INSERT"))
                .collect::<Vec<_>>()
                .join("\n")
                .into_boxed_str(),
        )
    }

    fn export_dir_names(orchestrator: &SyncOrchestrator) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(orchestrator.config().paths.exports_dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_empty_export_fails_catalog_validation() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = sqlite_orchestrator(dir.path(), Some(schema_only_dump()));

        let outcome = orchestrator.run_at(stamp(0)).await;

        assert!(matches!(
            outcome,
            SyncOutcome::Failed { stage: SyncStage::ValidateCatalog, error: Error::Validation(_) }
        ));
        assert!(export_dir_names(&orchestrator).is_empty());
    }

    #[tokio::test]
    async fn test_rejected_export_never_replaces_served_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let good = sqlite_orchestrator(dir.path(), Some(SEED_DUMP));
        assert!(good.run_at(stamp(0)).await.is_success());

        let index = CatalogIndex::new(good.config().paths.exports_dir(), 10);
        index.reload().unwrap();
        assert_eq!(index.search("beras").unwrap().records.len(), 2);

        let empty = sqlite_orchestrator(dir.path(), Some(schema_only_dump()));
        let outcome = empty.run_at(stamp(1)).await;
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(export_dir_names(&empty), vec!["01012025-0800.csv"]);

        let snapshot = index.reload().unwrap();
        assert!(snapshot.source_path.ends_with("01012025-0800.csv"));
        assert_eq!(index.search("beras").unwrap().records.len(), 2);
    }

    #[tokio::test]
    async fn test_old_backups_pruned_after_success() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = sqlite_orchestrator(dir.path(), Some(SEED_DUMP));
        assert_eq!(orchestrator.config().retention.max_backup_files, 2);

        for minute in 0..2 {
            let SyncOutcome::Succeeded { report } = orchestrator.run_at(stamp(minute)).await else {
                panic!("sync failed");
            };
            assert!(report.removed_backups.is_empty());
        }
        let SyncOutcome::Succeeded { report } = orchestrator.run_at(stamp(2)).await else {
            panic!("sync failed");
        };

        let backups_dir = orchestrator.config().paths.backups_dir();
        assert_eq!(report.removed_backups, vec![backups_dir.join("backup_01012025-0800.i5bu")]);
        let left = retention::list_files(&backups_dir, ".i5bu").unwrap();
        assert_eq!(left.len(), 2);
        assert!(report.backup_path.exists());
    }

    #[tokio::test]
    async fn test_held_lock_reports_locked() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = sqlite_orchestrator(dir.path(), Some(SEED_DUMP));
        let _held = RunLock::acquire(
            &orchestrator.config().paths.lock_file(),
            Duration::from_secs(3600),
        )
        .unwrap();

        let outcome = orchestrator.run_at(stamp(0)).await;

        assert_eq!(outcome.exit_code(), 2);
        assert!(matches!(outcome, SyncOutcome::Locked { .. }));
        assert!(!orchestrator.config().paths.history_file().exists());
    }

    #[tokio::test]
    async fn test_history_tracks_consecutive_failures() {
        let dir = tempfile::tempdir().unwrap();
        let failing = sqlite_orchestrator(dir.path(), None);
        failing.run_at(stamp(0)).await;
        failing.run_at(stamp(1)).await;

        let history_path = failing.config().paths.history_file();
        let history = RunHistory::load(&history_path);
        assert_eq!(history.consecutive_failures, 2);
        assert_eq!(history.last_failed_stage.as_deref(), Some("download"));

        let healthy = sqlite_orchestrator(dir.path(), Some(SEED_DUMP));
        assert!(healthy.run_at(stamp(2)).await.is_success());
        let history = RunHistory::load(&history_path);
        assert_eq!(history.consecutive_failures, 0);
        assert!(history.last_catalog.unwrap().ends_with("01012025-0802.csv"));
    }
}
