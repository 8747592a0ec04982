//! Per-branch comparison between a source and a target project.
//!
//! Purely informational: the result is attached to [`DiffDetails`] but never
//! changes the project's [`SyncStatus`].
//!
//! [`DiffDetails`]: super::DiffDetails
//! [`SyncStatus`]: super::SyncStatus

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Name and head commit of one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchHead {
    pub name: String,
    pub sha: Option<String>,
}

impl BranchHead {
    pub fn new(name: impl Into<String>, sha: Option<impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            sha: sha.map(Into::into),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BranchStatus {
    Synced,
    Outdated,
    MissingInTarget,
    ExtraInTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchComparison {
    pub name: String,
    pub source_sha: Option<String>,
    pub target_sha: Option<String>,
    pub is_default: bool,
    pub status: BranchStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSummary {
    pub total: usize,
    pub synced: usize,
    pub outdated: usize,
    pub missing_in_target: usize,
    pub extra_in_target: usize,
}

/// Compare the branch lists of both sides.
///
/// The default branch sorts first, the rest by name.
pub fn compare_branches(
    source: &[BranchHead],
    target: &[BranchHead],
    default_branch: Option<&str>,
) -> Vec<BranchComparison> {
    let source_map: BTreeMap<&str, Option<&str>> = source
        .iter()
        .map(|b| (b.name.as_str(), b.sha.as_deref()))
        .collect();
    let target_map: BTreeMap<&str, Option<&str>> = target
        .iter()
        .map(|b| (b.name.as_str(), b.sha.as_deref()))
        .collect();

    let names: BTreeSet<&str> = source_map.keys().chain(target_map.keys()).copied().collect();

    let mut comparisons: Vec<BranchComparison> = names
        .into_iter()
        .map(|name| {
            let source_sha = source_map.get(name).copied();
            let target_sha = target_map.get(name).copied();

            let status = match (source_sha, target_sha) {
                (Some(s), Some(t)) if s.is_some() && s == t => BranchStatus::Synced,
                (Some(_), Some(_)) => BranchStatus::Outdated,
                (Some(_), None) => BranchStatus::MissingInTarget,
                (None, _) => BranchStatus::ExtraInTarget,
            };

            BranchComparison {
                name: name.to_string(),
                source_sha: source_sha.flatten().map(str::to_string),
                target_sha: target_sha.flatten().map(str::to_string),
                is_default: default_branch == Some(name),
                status,
            }
        })
        .collect();

    // Names are already sorted; a stable sort only lifts the default branch.
    comparisons.sort_by_key(|c| !c.is_default);
    comparisons
}

pub fn summarize(comparisons: &[BranchComparison]) -> BranchSummary {
    comparisons
        .iter()
        .fold(BranchSummary::default(), |mut summary, c| {
            summary.total += 1;
            match c.status {
                BranchStatus::Synced => summary.synced += 1,
                BranchStatus::Outdated => summary.outdated += 1,
                BranchStatus::MissingInTarget => summary.missing_in_target += 1,
                BranchStatus::ExtraInTarget => summary.extra_in_target += 1,
            }
            summary
        })
}
