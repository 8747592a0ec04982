//! Source/target drift computation.
//!
//! [`compute_diff`] is a pure, total function of two optional snapshots: every
//! input yields exactly one [`SyncStatus`].

mod branch;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use branch::{
    BranchComparison, BranchHead, BranchStatus, BranchSummary, compare_branches, summarize,
};

/// Size deviations above this percent make a project inconsistent.
pub const INCONSISTENT_SIZE_PERCENT: f64 = 10.0;
/// Matching SHAs within this delay count as synced.
pub const SYNCED_DELAY_MINUTES: i64 = 5;
/// Delays above this make a project outdated even when SHAs match.
pub const OUTDATED_DELAY_MINUTES: i64 = 30;

/// Point-in-time view of one side of a mirror.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub commit_sha: Option<String>,
    pub commit_count: Option<i64>,
    pub branch_count: Option<i64>,
    pub size_bytes: Option<i64>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub default_branch: Option<String>,
    /// Branch heads when details were fetched; empty otherwise.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<BranchHead>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Synced,
    Outdated,
    Inconsistent,
    Failed,
}

impl SyncStatus {
    pub const ALL: [SyncStatus; 4] = [
        SyncStatus::Synced,
        SyncStatus::Outdated,
        SyncStatus::Inconsistent,
        SyncStatus::Failed,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Outdated => "outdated",
            SyncStatus::Inconsistent => "inconsistent",
            SyncStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Measurements derived from two snapshots. All `None` unless both exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffDetails {
    /// Source commits minus target commits.
    pub commit_behind: Option<i64>,
    /// Target branches minus source branches.
    pub branch_diff: Option<i64>,
    pub size_diff_percent: Option<f64>,
    /// Minutes the target's last activity trails the source's.
    pub sync_delay_minutes: Option<i64>,
    pub commit_sha_matches: bool,
    pub default_branch_matches: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<BranchComparison>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_summary: Option<BranchSummary>,
}

/// The per-cycle comparison of one mirrored project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDiff {
    pub project_key: String,
    pub sync_project_id: Uuid,
    pub source: Option<ProjectSnapshot>,
    pub target: Option<ProjectSnapshot>,
    pub details: DiffDetails,
    pub status: SyncStatus,
    pub checked_at: DateTime<Utc>,
}

impl ProjectDiff {
    /// Compare both sides and stamp the result with `checked_at`.
    pub fn compute(
        project_key: impl Into<String>,
        sync_project_id: Uuid,
        source: Option<ProjectSnapshot>,
        target: Option<ProjectSnapshot>,
        checked_at: DateTime<Utc>,
    ) -> Self {
        let (details, status) = compute_diff(source.as_ref(), target.as_ref());
        Self {
            project_key: project_key.into(),
            sync_project_id,
            source,
            target,
            details,
            status,
            checked_at,
        }
    }

    #[must_use]
    pub fn target_exists(&self) -> bool {
        self.target.is_some()
    }
}

/// Compute diff details and the resulting status.
pub fn compute_diff(
    source: Option<&ProjectSnapshot>,
    target: Option<&ProjectSnapshot>,
) -> (DiffDetails, SyncStatus) {
    let (Some(source), Some(target)) = (source, target) else {
        return (DiffDetails::default(), SyncStatus::Failed);
    };

    let details = compute_details(source, target);
    let status = classify(&details);
    (details, status)
}

fn compute_details(source: &ProjectSnapshot, target: &ProjectSnapshot) -> DiffDetails {
    let commit_behind = source
        .commit_count
        .zip(target.commit_count)
        .map(|(s, t)| s - t);

    let branch_diff = source
        .branch_count
        .zip(target.branch_count)
        .map(|(s, t)| t - s);

    let size_diff_percent = match (source.size_bytes, target.size_bytes) {
        (Some(s), Some(t)) if s > 0 => Some((t - s).abs() as f64 * 100.0 / s as f64),
        _ => None,
    };

    let sync_delay_minutes = source
        .last_activity_at
        .zip(target.last_activity_at)
        .map(|(s, t)| (s - t).num_minutes());

    let commit_sha_matches = matches!(
        (&source.commit_sha, &target.commit_sha),
        (Some(s), Some(t)) if s == t
    );
    let default_branch_matches = matches!(
        (&source.default_branch, &target.default_branch),
        (Some(s), Some(t)) if s == t
    );

    let (branches, branch_summary) = if source.branches.is_empty() && target.branches.is_empty() {
        (Vec::new(), None)
    } else {
        let branches = compare_branches(
            &source.branches,
            &target.branches,
            source.default_branch.as_deref(),
        );
        let summary = summarize(&branches);
        (branches, Some(summary))
    };

    DiffDetails {
        commit_behind,
        branch_diff,
        size_diff_percent,
        sync_delay_minutes,
        commit_sha_matches,
        default_branch_matches,
        branches,
        branch_summary,
    }
}

/// First matching rule wins.
fn classify(details: &DiffDetails) -> SyncStatus {
    let branch_mismatch = details.branch_diff.is_some_and(|d| d != 0);
    let size_mismatch = details
        .size_diff_percent
        .is_some_and(|p| p > INCONSISTENT_SIZE_PERCENT);
    if branch_mismatch || size_mismatch {
        return SyncStatus::Inconsistent;
    }

    let delay = details.sync_delay_minutes;
    if details.commit_sha_matches && delay.is_none_or(|d| d < SYNCED_DELAY_MINUTES) {
        return SyncStatus::Synced;
    }

    if !details.commit_sha_matches || delay.is_some_and(|d| d > OUTDATED_DELAY_MINUTES) {
        return SyncStatus::Outdated;
    }

    SyncStatus::Synced
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn snapshot(sha: &str, commits: i64, branches: i64, size: i64, t: DateTime<Utc>) -> ProjectSnapshot {
        ProjectSnapshot {
            commit_sha: Some(sha.to_string()),
            commit_count: Some(commits),
            branch_count: Some(branches),
            size_bytes: Some(size),
            last_activity_at: Some(t),
            default_branch: Some("main".to_string()),
            branches: Vec::new(),
        }
    }

    #[test]
    fn missing_target_fails() {
        let now = Utc::now();
        let source = snapshot("a", 1, 1, 1, now);
        let (details, status) = compute_diff(Some(&source), None);
        assert_eq!(status, SyncStatus::Failed);
        assert_eq!(details, DiffDetails::default());
    }

    #[test]
    fn missing_source_fails() {
        let now = Utc::now();
        let target = snapshot("a", 1, 1, 1, now);
        assert_eq!(compute_diff(None, Some(&target)).1, SyncStatus::Failed);
        assert_eq!(compute_diff(None, None).1, SyncStatus::Failed);
    }

    #[test]
    fn matching_recent_snapshots_are_synced() {
        let t = Utc::now();
        let source = snapshot("a", 10, 5, 1000, t);
        let target = snapshot("a", 10, 5, 1000, t - Duration::minutes(2));
        let (details, status) = compute_diff(Some(&source), Some(&target));
        assert_eq!(status, SyncStatus::Synced);
        assert_eq!(details.sync_delay_minutes, Some(2));
        assert_eq!(details.branch_diff, Some(0));
        assert!(details.commit_sha_matches);
        assert!(details.default_branch_matches);
    }

    #[test]
    fn extra_target_branch_is_inconsistent() {
        let t = Utc::now();
        let source = snapshot("a", 10, 5, 1000, t);
        let target = snapshot("a", 10, 6, 1000, t - Duration::minutes(2));
        let (details, status) = compute_diff(Some(&source), Some(&target));
        assert_eq!(details.branch_diff, Some(1));
        assert_eq!(status, SyncStatus::Inconsistent);
    }

    #[test]
    fn size_over_ten_percent_is_inconsistent() {
        let t = Utc::now();
        let source = snapshot("a", 10, 5, 1000, t);
        let target = snapshot("a", 10, 5, 1101, t);
        let (details, status) = compute_diff(Some(&source), Some(&target));
        assert_eq!(status, SyncStatus::Inconsistent);
        assert!(details.size_diff_percent.is_some_and(|p| p > 10.0));
    }

    #[test]
    fn size_diff_undefined_for_zero_source_size() {
        let t = Utc::now();
        let source = snapshot("a", 10, 5, 0, t);
        let target = snapshot("a", 10, 5, 500, t);
        let (details, status) = compute_diff(Some(&source), Some(&target));
        assert_eq!(details.size_diff_percent, None);
        assert_eq!(status, SyncStatus::Synced);
    }

    #[test]
    fn sha_mismatch_is_outdated() {
        let t = Utc::now();
        let source = snapshot("a", 11, 5, 1000, t);
        let target = snapshot("b", 10, 5, 1000, t);
        let (details, status) = compute_diff(Some(&source), Some(&target));
        assert_eq!(details.commit_behind, Some(1));
        assert_eq!(status, SyncStatus::Outdated);
    }

    #[test]
    fn matching_sha_with_long_delay_is_outdated() {
        let t = Utc::now();
        let source = snapshot("a", 10, 5, 1000, t);
        let target = snapshot("a", 10, 5, 1000, t - Duration::minutes(31));
        assert_eq!(compute_diff(Some(&source), Some(&target)).1, SyncStatus::Outdated);
    }

    #[test]
    fn matching_sha_within_grace_window_is_synced() {
        let t = Utc::now();
        for minutes in [5, 17, 30] {
            let source = snapshot("a", 10, 5, 1000, t);
            let target = snapshot("a", 10, 5, 1000, t - Duration::minutes(minutes));
            assert_eq!(
                compute_diff(Some(&source), Some(&target)).1,
                SyncStatus::Synced,
                "delay {minutes}"
            );
        }
    }

    #[test]
    fn missing_sha_never_matches() {
        let t = Utc::now();
        let mut source = snapshot("a", 10, 5, 1000, t);
        let mut target = source.clone();
        source.commit_sha = None;
        target.commit_sha = None;
        let (details, status) = compute_diff(Some(&source), Some(&target));
        assert!(!details.commit_sha_matches);
        assert_eq!(status, SyncStatus::Outdated);
    }

    #[test]
    fn small_size_drift_stays_synced() {
        let now = Utc::now();
        let source = snapshot("abc123", 100, 5, 1_000_000, now);
        let target = snapshot("abc123", 100, 5, 1_020_000, now - Duration::minutes(1));
        let (details, status) = compute_diff(Some(&source), Some(&target));
        assert_eq!(status, SyncStatus::Synced);
        let percent = details.size_diff_percent.expect("size diff defined");
        assert!((percent - 2.0).abs() < 1e-9);
    }

    #[test]
    fn branch_report_is_informational() {
        let t = Utc::now();
        let mut source = snapshot("a", 10, 2, 1000, t);
        let mut target = snapshot("a", 10, 2, 1000, t);
        source.branches = vec![BranchHead::new("main", Some("a")), BranchHead::new("dev", Some("x"))];
        target.branches = vec![BranchHead::new("main", Some("a")), BranchHead::new("dev", Some("y"))];

        let (details, status) = compute_diff(Some(&source), Some(&target));
        assert_eq!(status, SyncStatus::Synced);
        let summary = details.branch_summary.expect("summary present");
        assert_eq!(summary.outdated, 1);
        assert_eq!(details.branches[0].name, "main");
    }

    #[test]
    fn project_diff_compute_keeps_snapshots() {
        let t = Utc::now();
        let diff = ProjectDiff::compute(
            "team/app",
            Uuid::nil(),
            Some(snapshot("a", 1, 1, 1, t)),
            None,
            t,
        );
        assert_eq!(diff.status, SyncStatus::Failed);
        assert!(!diff.target_exists());
        assert_eq!(diff.project_key, "team/app");
    }
}
