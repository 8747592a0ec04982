//! Sync task scheduling.
//!
//! # Module Structure
//!
//! - [`cadence`] - priority intervals and failure backoff
//! - [`classify`] - keyword classification of failure messages
//! - [`budget`] - the shared peak/off-peak concurrency budget
//! - [`transition`] - pure task state transitions
//! - `dispatch` - the tick loop that claims due tasks and runs them
//! - [`operator`] - manual retry and failure reset

pub mod budget;
pub mod cadence;
pub mod classify;
mod dispatch;
pub mod operator;
pub mod transition;

use serde::Deserialize;
use thiserror::Error;

use crate::store::StoreError;

pub use budget::{BudgetPermit, ConcurrencyConfig, SyncBudget, available_slots};
pub use cadence::{CadenceTable, failure_backoff};
pub use classify::{ErrorType, classify};
pub use dispatch::{DispatchReport, Executors, Scheduler};
pub use operator::{reset_project, retry_project};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No sync task found for project {0}")]
    NoTasks(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between dispatch ticks.
    pub tick_interval_secs: u64,
    pub cadence: CadenceTable,
    pub concurrency: ConcurrencyConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            cadence: CadenceTable::default(),
            concurrency: ConcurrencyConfig::default(),
        }
    }
}
