//! Restore + export state machine
//!
//! `NotStarted → Dropping → Creating → Restoring → Exporting → Done`, with any step
//! failing into `Failed`. No step is retried; a new run starts a new cycle.

use std::fmt;
use std::path::Path;

use super::{ExportSummary, RelationalStore, ITEM_TABLE};
use crate::error::{Error, Result};

/// Phase of a restore + export cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CyclePhase {
    NotStarted,
    Dropping,
    Creating,
    Restoring,
    Exporting,
    Done,
    Failed { step: String, cause: String },
}

impl CyclePhase {
    fn step_name(&self) -> &'static str {
        match self {
            CyclePhase::NotStarted => "not started",
            CyclePhase::Dropping => "drop database",
            CyclePhase::Creating => "create database",
            CyclePhase::Restoring => "restore dump",
            CyclePhase::Exporting => "export",
            CyclePhase::Done => "done",
            CyclePhase::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CyclePhase::Failed { step, cause } => write!(f, "failed during {}: {}", step, cause),
            other => f.write_str(other.step_name()),
        }
    }
}

/// Drives a store through one restore + export cycle
#[derive(Debug)]
pub struct RestoreCycle {
    phase: CyclePhase,
}

impl Default for RestoreCycle {
    fn default() -> Self {
        Self::new()
    }
}

impl RestoreCycle {
    pub fn new() -> Self {
        Self {
            phase: CyclePhase::NotStarted,
        }
    }

    /// Current phase
    pub fn phase(&self) -> &CyclePhase {
        &self.phase
    }

    fn enter(&mut self, phase: CyclePhase) {
        tracing::debug!("Restore cycle: {}", phase);
        self.phase = phase;
    }

    fn fail(&mut self, error: &Error) {
        let step = self.phase.step_name().to_string();
        self.phase = CyclePhase::Failed {
            step,
            cause: error.to_string(),
        };
    }

    /// Drop, create, and restore. The database is left as the last successful
    /// sub-step produced it.
    pub async fn restore<S>(&mut self, store: &S, backup_path: &Path) -> Result<()>
    where
        S: RelationalStore + ?Sized,
    {
        tracing::info!("Restoring {} database from: {}", store.name(), backup_path.display());

        self.enter(CyclePhase::Dropping);
        let dropped = store.drop_database().await;
        self.check_restore_step(dropped)?;

        self.enter(CyclePhase::Creating);
        let created = store.create_database().await;
        self.check_restore_step(created)?;

        self.enter(CyclePhase::Restoring);
        let restored = store.restore_dump(backup_path).await;
        self.check_restore_step(restored)?;

        tracing::info!("Database restored successfully");
        Ok(())
    }

    fn check_restore_step(&mut self, outcome: Result<()>) -> Result<()> {
        outcome.map_err(|e| {
            let e = match e {
                e @ Error::Restore { .. } => e,
                other => Error::restore(self.phase.step_name(), other.to_string()),
            };
            self.fail(&e);
            e
        })
    }

    /// Export the catalog. Zero rows from a non-empty source is logged, not failed.
    pub async fn export<S>(&mut self, store: &S, output_path: &Path) -> Result<ExportSummary>
    where
        S: RelationalStore + ?Sized,
    {
        self.enter(CyclePhase::Exporting);

        let summary = match store.export(output_path).await {
            Ok(summary) => summary,
            Err(e) => {
                let e = match e {
                    e @ Error::Export(_) => e,
                    other => Error::export(other.to_string()),
                };
                self.fail(&e);
                return Err(e);
            }
        };

        if summary.rows == 0 {
            match store.source_item_count().await {
                Ok(0) => tracing::warn!("Exported an empty catalog: {} is empty", ITEM_TABLE),
                Ok(items) => tracing::warn!(
                    "Export wrote zero rows although {} has {} rows",
                    ITEM_TABLE,
                    items
                ),
                Err(e) => tracing::warn!("Export wrote zero rows; could not count {}: {}", ITEM_TABLE, e),
            }
        }

        tracing::info!("Exported {} rows to: {}", summary.rows, summary.path.display());
        self.enter(CyclePhase::Done);
        Ok(summary)
    }
}
