//! Scheduled sync run and its guards
//!
//! - `SyncOrchestrator`: the fail-fast stage sequence
//! - `RunLock`: one run per database target
//! - `RunHistory`: consecutive-failure tracking for the stale-catalog alert

mod history;
mod lock;
mod orchestrator;

pub use history::RunHistory;
pub use lock::{LockInfo, RunLock};
pub use orchestrator::{SyncOrchestrator, SyncOutcome, SyncReport, SyncStage};
