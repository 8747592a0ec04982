//! GitLab REST payloads and client configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Project as returned by `/api/v4/projects` with `statistics=true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitLabProject {
    pub id: u64,
    pub name: String,
    pub path: String,
    pub path_with_namespace: String,
    pub default_branch: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub http_url_to_repo: Option<String>,
    pub namespace: Option<GitLabNamespace>,
    pub statistics: Option<ProjectStatistics>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub empty_repo: bool,
}

impl GitLabProject {
    #[must_use]
    pub fn commit_count(&self) -> Option<i64> {
        self.statistics.as_ref().and_then(|s| s.commit_count)
    }

    #[must_use]
    pub fn repository_size(&self) -> Option<i64> {
        self.statistics.as_ref().and_then(|s| s.repository_size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLabNamespace {
    pub id: u64,
    pub full_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStatistics {
    pub commit_count: Option<i64>,
    pub repository_size: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLabBranch {
    pub name: String,
    #[serde(default)]
    pub default: bool,
    pub commit: Option<BranchCommit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchCommit {
    pub id: String,
    pub committed_date: Option<DateTime<Utc>>,
}

/// A push mirror configured on a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMirror {
    pub id: u64,
    pub url: String,
    #[serde(default)]
    pub enabled: bool,
    pub update_status: Option<String>,
    pub last_successful_update_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLabGroup {
    pub id: u64,
    pub name: String,
    pub full_path: String,
}

/// Query for one page of the project listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListProjectsQuery {
    /// Restrict to a group (subgroups included). `None` lists all member projects.
    pub group_path: Option<String>,
    /// Only projects updated after this instant, ordered by update time.
    pub updated_after: Option<DateTime<Utc>>,
    /// 1-indexed page number.
    pub page: u32,
    pub per_page: u32,
}

/// Connection settings for one GitLab host.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct GitLabHostConfig {
    /// Host name or base URL, e.g. `gitlab.example.com` or `https://gitlab.example.com`.
    pub host: String,
    /// Personal or project access token.
    pub token: Option<String>,
    /// Restrict listings to this group.
    pub group: Option<String>,
    /// Proactive request rate limit. `0` disables limiting.
    pub requests_per_second: u32,
    pub request_timeout_secs: u64,
}

impl Default for GitLabHostConfig {
    fn default() -> Self {
        Self {
            host: "gitlab.com".to_string(),
            token: None,
            group: None,
            requests_per_second: super::rate_limit::DEFAULT_RPS,
            request_timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for GitLabHostConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitLabHostConfig")
            .field("host", &self.host)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("group", &self.group)
            .field("requests_per_second", &self.requests_per_second)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}
