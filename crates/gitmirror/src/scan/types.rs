//! Scan types and defaults.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::batch::EnrichedProject;
use crate::diff::{BranchHead, ProjectSnapshot};
use crate::entity::sync_project::SyncMethod;

/// Cache key prefix for per-project diffs.
pub const DIFF_KEY_PREFIX: &str = "diff:";

/// Cache key of the last successful scan's start time.
pub const LAST_SCAN_KEY: &str = "last_scan_time";

/// Look-back window of an incremental scan with no previous scan.
pub const DEFAULT_LOOKBACK_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    /// Every project on both hosts.
    Full,
    /// Only projects active since the previous scan.
    Incremental,
}

impl ScanType {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanType::Full => "full",
            ScanType::Incremental => "incremental",
        }
    }
}

impl std::fmt::Display for ScanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Success,
    Failed,
}

impl ScanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanStatus::Success => "success",
            ScanStatus::Failed => "failed",
        }
    }
}

/// Summary of one scan pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    pub scan_type: ScanType,
    pub status: ScanStatus,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub projects_scanned: usize,
    pub new_projects: usize,
    /// Diffs whose status is not synced.
    pub changes_detected: usize,
    pub alerts_created: usize,
    pub alerts_resolved: usize,
    /// Tracked projects absent from a complete source listing.
    pub deleted_projects: usize,
}

/// Counters gathered while a scan runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ScanCounts {
    pub projects_scanned: usize,
    pub new_projects: usize,
    pub changes_detected: usize,
    pub alerts_created: usize,
    pub alerts_resolved: usize,
    pub deleted_projects: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Seconds between periodic scans.
    pub interval_secs: u64,
    /// Every Nth periodic scan is a full one.
    pub full_scan_every: u32,
    pub diff_ttl_secs: u64,
    pub last_scan_ttl_secs: u64,
    /// Sync method for projects first seen by a scan.
    pub default_sync_method: SyncMethod,
    /// Parent directory of working copies for new projects.
    pub repos_dir: PathBuf,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            full_scan_every: 12,
            diff_ttl_secs: 900,
            last_scan_ttl_secs: 86_400,
            default_sync_method: SyncMethod::PushMirror,
            repos_dir: PathBuf::from("repos"),
        }
    }
}

impl ScanConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn diff_ttl(&self) -> Duration {
        Duration::from_secs(self.diff_ttl_secs)
    }

    pub fn last_scan_ttl(&self) -> Duration {
        Duration::from_secs(self.last_scan_ttl_secs)
    }
}

/// Build a diff snapshot from a listed project and its details.
///
/// Without details the branch count and head SHA are unknown.
pub fn snapshot(enriched: &EnrichedProject) -> ProjectSnapshot {
    let project = &enriched.project;
    let detail = enriched.detail.as_ref();

    let commit_sha = detail.and_then(|d| {
        d.default_branch_commit
            .as_ref()
            .map(|c| c.id.clone())
            .or_else(|| {
                d.branches
                    .iter()
                    .find(|b| b.default)
                    .and_then(|b| b.commit.as_ref().map(|c| c.id.clone()))
            })
    });

    let branches = detail
        .map(|d| {
            d.branches
                .iter()
                .map(|b| BranchHead::new(&b.name, b.commit.as_ref().map(|c| c.id.as_str())))
                .collect()
        })
        .unwrap_or_default();

    ProjectSnapshot {
        commit_sha,
        commit_count: project.commit_count(),
        branch_count: detail.map(|d| d.branches.len() as i64),
        size_bytes: project.repository_size(),
        last_activity_at: project.last_activity_at,
        default_branch: project.default_branch.clone(),
        branches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ProjectDetail;
    use crate::gitlab::{BranchCommit, GitLabBranch, GitLabProject, ProjectStatistics};

    fn project() -> GitLabProject {
        GitLabProject {
            id: 7,
            name: "app".into(),
            path: "app".into(),
            path_with_namespace: "team/app".into(),
            default_branch: Some("main".into()),
            last_activity_at: None,
            http_url_to_repo: None,
            namespace: None,
            statistics: Some(ProjectStatistics {
                commit_count: Some(100),
                repository_size: Some(1_000_000),
            }),
            archived: false,
            empty_repo: false,
        }
    }

    fn branch(name: &str, sha: &str, default: bool) -> GitLabBranch {
        GitLabBranch {
            name: name.into(),
            default,
            commit: Some(BranchCommit {
                id: sha.into(),
                committed_date: None,
            }),
        }
    }

    #[test]
    fn snapshot_uses_default_branch_commit() {
        let enriched = EnrichedProject {
            project: project(),
            detail: Some(ProjectDetail {
                branches: vec![branch("main", "abc", true), branch("dev", "def", false)],
                default_branch_commit: Some(BranchCommit {
                    id: "abc".into(),
                    committed_date: None,
                }),
            }),
        };

        let snap = snapshot(&enriched);
        assert_eq!(snap.commit_sha.as_deref(), Some("abc"));
        assert_eq!(snap.branch_count, Some(2));
        assert_eq!(snap.commit_count, Some(100));
        assert_eq!(snap.size_bytes, Some(1_000_000));
        assert_eq!(snap.branches.len(), 2);
    }

    #[test]
    fn snapshot_falls_back_to_default_flag() {
        let enriched = EnrichedProject {
            project: project(),
            detail: Some(ProjectDetail {
                branches: vec![branch("dev", "def", false), branch("main", "abc", true)],
                default_branch_commit: None,
            }),
        };
        assert_eq!(snapshot(&enriched).commit_sha.as_deref(), Some("abc"));
    }

    #[test]
    fn snapshot_without_details_leaves_branch_data_unknown() {
        let enriched = EnrichedProject {
            project: project(),
            detail: None,
        };
        let snap = snapshot(&enriched);
        assert_eq!(snap.commit_sha, None);
        assert_eq!(snap.branch_count, None);
        assert!(snap.branches.is_empty());
    }

    #[test]
    fn scan_type_names() {
        assert_eq!(ScanType::Full.to_string(), "full");
        assert_eq!(ScanType::Incremental.to_string(), "incremental");
    }
}
