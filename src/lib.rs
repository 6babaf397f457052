// src/lib.rs
// Public library surface for integration tests and the binary.

pub mod api;
pub mod catalog;
pub mod config;
pub mod frequency;
pub mod history;
pub mod metrics;
pub mod model;
pub mod monitor;
pub mod scheduler;
pub mod store;
pub mod turnover;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::config::PollerConfig;
pub use crate::frequency::{AdjustOutcome, ControllerHandle, FrequencyController, SkipReason};
pub use crate::scheduler::{Scheduler, SchedulerSettings, StartOutcome, Status, StopOutcome};
pub use crate::turnover::TurnoverAnalyzer;

use std::sync::Arc;

use crate::monitor::SessionRunner;
use crate::store::Persistence;
use crate::types::{ItemFetcher, ProcessCycle};

/// Wire a scheduler from config and collaborators, restoring any persisted
/// adjustment history.
pub async fn build_scheduler(
    cfg: &PollerConfig,
    fetcher: Arc<dyn ItemFetcher>,
    cycle: Arc<dyn ProcessCycle>,
    store: Arc<dyn Persistence>,
) -> Scheduler {
    let controller = ControllerHandle::restore(
        cfg.controller_settings(),
        store.clone(),
        cfg.resume_from_history,
    )
    .await;
    let runner = SessionRunner::new(fetcher, store, cfg.sources.clone());
    Scheduler::new(controller, cycle, runner, SchedulerSettings::from(cfg))
}
