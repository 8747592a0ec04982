//! Threshold evaluation: turns a [`ProjectDiff`] into alert candidates.
//!
//! Evaluation is independent of the diff's [`SyncStatus`](crate::diff::SyncStatus);
//! a synced project can still raise a size alert.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::diff::{ProjectDiff, ProjectSnapshot, SyncStatus};
use crate::entity::monitor_alert::{AlertType, Severity};

/// Alert thresholds. All comparisons are strict (`>`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub sync_delay_minutes: i64,
    pub critical_delay_hours: i64,
    pub commit_diff_alert: i64,
    pub size_diff_tolerance: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            sync_delay_minutes: 30,
            critical_delay_hours: 2,
            commit_diff_alert: 10,
            size_diff_tolerance: 5.0,
        }
    }
}

/// A candidate alert, before dedup and persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertInfo {
    pub sync_project_id: Uuid,
    pub project_key: String,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub sync_status: SyncStatus,
}

impl AlertInfo {
    fn for_diff(diff: &ProjectDiff, alert_type: AlertType, severity: Severity, message: String) -> Self {
        Self {
            sync_project_id: diff.sync_project_id,
            project_key: diff.project_key.clone(),
            alert_type,
            severity,
            message,
            sync_status: diff.status,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ThresholdEvaluator {
    config: ThresholdConfig,
}

impl ThresholdEvaluator {
    pub fn new(config: ThresholdConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    /// Evaluate one project. A missing target short-circuits every other rule.
    pub fn evaluate(&self, diff: &ProjectDiff) -> Vec<AlertInfo> {
        let cfg = &self.config;
        let details = &diff.details;

        if diff.target.is_none() {
            return vec![AlertInfo::for_diff(
                diff,
                AlertType::TargetMissing,
                Severity::Critical,
                "Target project does not exist".to_string(),
            )];
        }

        let mut alerts = Vec::new();

        if let Some(delay) = details.sync_delay_minutes {
            if delay > cfg.critical_delay_hours * 60 {
                alerts.push(AlertInfo::for_diff(
                    diff,
                    AlertType::SyncDelay,
                    Severity::Critical,
                    format!(
                        "Sync delay {delay} minutes exceeds critical threshold {} hours",
                        cfg.critical_delay_hours
                    ),
                ));
            } else if delay > cfg.sync_delay_minutes {
                alerts.push(AlertInfo::for_diff(
                    diff,
                    AlertType::SyncDelay,
                    Severity::High,
                    format!(
                        "Sync delay {delay} minutes exceeds threshold {} minutes",
                        cfg.sync_delay_minutes
                    ),
                ));
            }
        }

        if let Some(behind) = details.commit_behind {
            if behind.abs() > cfg.commit_diff_alert {
                let severity = if behind.abs() > cfg.commit_diff_alert * 2 {
                    Severity::High
                } else {
                    Severity::Medium
                };
                alerts.push(AlertInfo::for_diff(
                    diff,
                    AlertType::CommitDiff,
                    severity,
                    format!(
                        "Commit difference {behind} exceeds threshold {}",
                        cfg.commit_diff_alert
                    ),
                ));
            }
        }

        if details.branch_diff.is_some_and(|d| d != 0) {
            let count = |side: Option<&ProjectSnapshot>| {
                side.and_then(|s| s.branch_count)
                    .map_or_else(|| "unknown".to_string(), |c| c.to_string())
            };
            alerts.push(AlertInfo::for_diff(
                diff,
                AlertType::BranchDiff,
                Severity::Medium,
                format!(
                    "Branch count mismatch: source={}, target={}",
                    count(diff.source.as_ref()),
                    count(diff.target.as_ref())
                ),
            ));
        }

        if let Some(percent) = details.size_diff_percent {
            if percent > cfg.size_diff_tolerance {
                let severity = if percent > cfg.size_diff_tolerance * 2.0 {
                    Severity::Medium
                } else {
                    Severity::Low
                };
                alerts.push(AlertInfo::for_diff(
                    diff,
                    AlertType::SizeDiff,
                    severity,
                    format!(
                        "Repository size difference {percent:.2}% exceeds tolerance {:.2}%",
                        cfg.size_diff_tolerance
                    ),
                ));
            }
        }

        alerts
    }

    pub fn evaluate_all(&self, diffs: &[ProjectDiff]) -> Vec<AlertInfo> {
        let alerts: Vec<AlertInfo> = diffs.iter().flat_map(|d| self.evaluate(d)).collect();
        tracing::debug!(
            projects = diffs.len(),
            alerts = alerts.len(),
            "Evaluated alert thresholds"
        );
        alerts
    }
}
