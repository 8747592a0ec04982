//! Alert lifecycle: deduplicated creation, resolution, auto-resolve and mute.
//!
//! Dedup is enforced by the database rather than in process. Each live alert
//! holds a `"{project}:{type}"` key under a unique index, so concurrent scans
//! racing to raise the same alert produce exactly one row.

mod lifecycle;

use sea_orm::DbErr;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

pub use lifecycle::{AlertManager, has_recovered};

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Alert not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, AlertError>;

/// Below these values an active alert is considered recovered.
///
/// They sit under the raising thresholds, so a metric hovering around a
/// threshold does not flap between active and resolved.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub sync_delay_minutes: i64,
    pub commit_diff: i64,
    pub branch_diff: i64,
    pub size_diff_percent: f64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            sync_delay_minutes: 5,
            commit_diff: 5,
            branch_diff: 0,
            size_diff_percent: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// A second alert for the same project and type inside this window is a duplicate.
    pub dedup_window_minutes: i64,
    /// Resolved alerts older than this are purged.
    pub retention_days: i64,
    pub recovery: RecoveryConfig,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            dedup_window_minutes: 60,
            retention_days: 30,
            recovery: RecoveryConfig::default(),
        }
    }
}
