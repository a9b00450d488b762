//! Scheduled sync entry point
//!
//! Exit status: 0 on success, 1 when a stage failed, 2 when another run holds the lock.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use catalog_sync::{
    store_from_config, telemetry, CatalogIndex, CatalogResponder, DropboxBackupSource, SyncConfig,
    SyncOrchestrator,
};

/// Sync the product catalog from the newest POS backup
#[derive(Debug, Parser)]
#[command(name = "catalog-sync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file (environment variables override it)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Print the resolved configuration with secrets masked and exit
    #[arg(long)]
    dry_run: bool,

    /// Look up products in the newest exported catalog instead of syncing
    #[arg(long, value_name = "QUERY")]
    search: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = SyncConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if args.dry_run {
        let rendered = toml::to_string_pretty(&config.redacted()).context("Failed to render configuration")?;
        println!("{}", rendered);
        return Ok(());
    }

    let log_path = telemetry::init_tracing(&config.paths.logs_dir)?;
    tracing::debug!("Logging to {}", log_path.display());

    if let Some(query) = args.search {
        let index = Arc::new(CatalogIndex::new(
            config.paths.exports_dir(),
            config.catalog.search_results_limit,
        ));
        let responder = CatalogResponder::new(index);
        println!("{}", responder.reload_reply());
        println!("{}", responder.search_reply(&query));
        return Ok(());
    }

    config.require_credentials()?;
    tracing::info!("Configuration loaded");
    tracing::info!("  - Dropbox folder: {}", config.dropbox.folder_path);
    tracing::info!(
        "  - Database: {:?} {}@{}:{}/{}",
        config.database.engine,
        config.database.user,
        config.database.host,
        config.database.port,
        config.database.name
    );
    tracing::info!("  - Data dir: {}", config.paths.data_dir.display());
    tracing::info!("  - Keep catalogs: {}", config.retention.max_csv_files);
    tracing::info!("  - Keep backups: {}", config.retention.max_backup_files);

    let source = Arc::new(DropboxBackupSource::new(&config.dropbox)?);
    let store = store_from_config(&config);
    let orchestrator = SyncOrchestrator::new(config, source, store);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let outcome = runtime.block_on(orchestrator.run());

    std::process::exit(outcome.exit_code());
}
