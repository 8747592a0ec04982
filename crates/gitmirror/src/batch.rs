//! Batch project queries against one GitLab host.
//!
//! Listing is paginated with per-request retries and an overall deadline.
//! Per-project detail enrichment runs on a bounded worker pool and tolerates
//! individual failures.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::gitlab::{
    BranchCommit, GitLabBranch, GitLabError, GitLabProject, ListProjectsQuery, RepositoryClient,
};
use crate::retry::{RetryConfig, with_retry};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Project query failed on {host} (page {page}): {source}")]
    QueryFailed {
        host: String,
        page: u32,
        #[source]
        source: GitLabError,
    },

    #[error("Project lookup failed for {path}: {source}")]
    LookupFailed {
        path: String,
        #[source]
        source: GitLabError,
    },
}

pub type Result<T> = std::result::Result<T, BatchError>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub page_size: u32,
    /// Wall-clock budget for one listing, checked after each page.
    pub timeout_secs: u64,
    /// Concurrent detail fetches per batch.
    pub detail_concurrency: usize,
    pub retry: RetryConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            timeout_secs: 30,
            detail_concurrency: 5,
            retry: RetryConfig::default(),
        }
    }
}

impl BatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Branch data fetched for a single project.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProjectDetail {
    pub branches: Vec<GitLabBranch>,
    pub default_branch_commit: Option<BranchCommit>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedProject {
    pub project: GitLabProject,
    /// `None` when the detail fetch failed.
    pub detail: Option<ProjectDetail>,
}

/// Result of one paginated listing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProjectListing {
    pub projects: Vec<GitLabProject>,
    /// False when the deadline cut the listing short.
    pub complete: bool,
}

/// Paginated listing and detail enrichment for one host.
#[derive(Clone)]
pub struct BatchQueryExecutor {
    client: Arc<dyn RepositoryClient>,
    group: Option<String>,
    label: String,
    config: BatchConfig,
}

impl std::fmt::Debug for BatchQueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchQueryExecutor")
            .field("host", &self.client.host())
            .field("group", &self.group)
            .field("label", &self.label)
            .field("config", &self.config)
            .finish()
    }
}

impl BatchQueryExecutor {
    pub fn new(client: Arc<dyn RepositoryClient>, config: BatchConfig) -> Self {
        let label = client.host().to_string();
        Self {
            client,
            group: None,
            label,
            config,
        }
    }

    /// Restrict listings to a group and its subgroups.
    #[must_use]
    pub fn with_group(mut self, group: Option<String>) -> Self {
        self.group = group;
        self
    }

    /// Name used in logs, e.g. `"source"`.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn client(&self) -> &Arc<dyn RepositoryClient> {
        &self.client
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// List projects, optionally only those updated after `updated_after`.
    ///
    /// Stops on a short page or when the deadline has passed; the latter
    /// returns what was collected so far. A page that still fails after
    /// all retries aborts the whole listing.
    pub async fn query_projects(
        &self,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<GitLabProject>> {
        Ok(self.list_projects(updated_after).await?.projects)
    }

    /// Like [`query_projects`](Self::query_projects), but reports whether
    /// the listing ran to its last page.
    pub async fn list_projects(&self, updated_after: Option<DateTime<Utc>>) -> Result<ProjectListing> {
        let page_size = self.config.page_size.max(1);
        let deadline = Instant::now() + self.config.timeout();
        let mut projects = Vec::new();
        let mut page = 1u32;
        let mut complete = true;

        loop {
            let query = ListProjectsQuery {
                group_path: self.group.clone(),
                updated_after,
                page,
                per_page: page_size,
            };
            let call = format!("{} list_projects page {page}", self.label);
            let batch = with_retry(
                || self.client.list_projects(&query),
                &self.config.retry,
                |_: &GitLabError| true,
                &call,
            )
            .await
            .map_err(|source| BatchError::QueryFailed {
                host: self.client.host().to_string(),
                page,
                source,
            })?;

            let fetched = batch.len();
            projects.extend(batch);
            tracing::debug!(
                host = %self.label,
                page,
                fetched,
                total = projects.len(),
                "Fetched project page"
            );

            if fetched < page_size as usize {
                break;
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    host = %self.label,
                    pages = page,
                    collected = projects.len(),
                    timeout_secs = self.config.timeout_secs,
                    "Project query timed out, returning partial result"
                );
                complete = false;
                break;
            }
            page += 1;
        }

        Ok(ProjectListing { projects, complete })
    }

    /// Fetch branch details for every project, preserving input order.
    pub async fn fetch_details(&self, projects: Vec<GitLabProject>) -> Vec<EnrichedProject> {
        let semaphore = Arc::new(Semaphore::new(self.config.detail_concurrency.max(1)));
        let mut handles = Vec::with_capacity(projects.len());

        for project in projects {
            let semaphore = Arc::clone(&semaphore);
            let client = Arc::clone(&self.client);
            let label = self.label.clone();
            let fallback = project.clone();

            let handle = tokio::spawn(async move {
                let detail = match semaphore.acquire().await {
                    Ok(_permit) => match fetch_detail(client.as_ref(), &project).await {
                        Ok(detail) => Some(detail),
                        Err(e) => {
                            tracing::warn!(
                                host = %label,
                                project = %project.path_with_namespace,
                                error = %e,
                                "Failed to fetch project details"
                            );
                            None
                        }
                    },
                    Err(_) => {
                        tracing::error!(host = %label, "Semaphore closed unexpectedly");
                        None
                    }
                };
                EnrichedProject { project, detail }
            });
            handles.push((fallback, handle));
        }

        let mut enriched = Vec::with_capacity(handles.len());
        for (project, handle) in handles {
            match handle.await {
                Ok(item) => enriched.push(item),
                Err(e) => {
                    tracing::error!(
                        host = %self.label,
                        project = %project.path_with_namespace,
                        "Task panic: {}",
                        e
                    );
                    enriched.push(EnrichedProject {
                        project,
                        detail: None,
                    });
                }
            }
        }
        enriched
    }

    /// Look up a single project by path. Not-found yields `None`.
    pub async fn lookup_project(&self, path: &str) -> Result<Option<GitLabProject>> {
        match self.client.get_project(path).await {
            Ok(project) => Ok(Some(project)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(source) => Err(BatchError::LookupFailed {
                path: path.to_string(),
                source,
            }),
        }
    }
}

async fn fetch_detail(
    client: &dyn RepositoryClient,
    project: &GitLabProject,
) -> crate::gitlab::Result<ProjectDetail> {
    let branches = client.list_branches(project.id).await?;
    let default_branch_commit = match &project.default_branch {
        Some(name) => client.get_branch(project.id, name).await?.commit,
        None => None,
    };
    Ok(ProjectDetail {
        branches,
        default_branch_commit,
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::gitlab::{GitLabGroup, InMemoryGitLab, RemoteMirror};

    fn project(id: u64) -> GitLabProject {
        GitLabProject {
            id,
            name: format!("p{id}"),
            path: format!("p{id}"),
            path_with_namespace: format!("team/p{id}"),
            default_branch: Some("main".to_string()),
            last_activity_at: None,
            http_url_to_repo: None,
            namespace: None,
            statistics: None,
            archived: false,
            empty_repo: false,
        }
    }

    fn branch(name: &str, sha: &str) -> GitLabBranch {
        GitLabBranch {
            name: name.to_string(),
            default: name == "main",
            commit: Some(BranchCommit {
                id: sha.to_string(),
                committed_date: None,
            }),
        }
    }

    fn host_with(count: u64) -> Arc<InMemoryGitLab> {
        let host = Arc::new(InMemoryGitLab::new("https://git.example.com"));
        for id in 1..=count {
            host.insert_project(project(id));
        }
        host
    }

    /// Delegates to an in-memory host, sleeping before every listing call and
    /// optionally panicking on one project's branch listing.
    struct FaultyHost {
        inner: Arc<InMemoryGitLab>,
        delay: Duration,
        panic_branches_for: Option<u64>,
    }

    #[async_trait]
    impl RepositoryClient for FaultyHost {
        fn host(&self) -> &str {
            self.inner.host()
        }
        async fn list_projects(
            &self,
            query: &ListProjectsQuery,
        ) -> crate::gitlab::Result<Vec<GitLabProject>> {
            tokio::time::sleep(self.delay).await;
            self.inner.list_projects(query).await
        }
        async fn get_project(&self, p: &str) -> crate::gitlab::Result<GitLabProject> {
            self.inner.get_project(p).await
        }
        async fn list_branches(&self, id: u64) -> crate::gitlab::Result<Vec<GitLabBranch>> {
            if self.panic_branches_for == Some(id) {
                panic!("branch listing blew up for {id}");
            }
            self.inner.list_branches(id).await
        }
        async fn get_branch(&self, id: u64, b: &str) -> crate::gitlab::Result<GitLabBranch> {
            self.inner.get_branch(id, b).await
        }
        async fn list_mirrors(&self, id: u64) -> crate::gitlab::Result<Vec<RemoteMirror>> {
            self.inner.list_mirrors(id).await
        }
        async fn create_mirror(&self, id: u64, url: &str) -> crate::gitlab::Result<RemoteMirror> {
            self.inner.create_mirror(id, url).await
        }
        async fn trigger_mirror_sync(&self, id: u64, m: Option<u64>) -> crate::gitlab::Result<()> {
            self.inner.trigger_mirror_sync(id, m).await
        }
        async fn get_group(&self, p: &str) -> crate::gitlab::Result<GitLabGroup> {
            self.inner.get_group(p).await
        }
        async fn create_group(
            &self,
            p: &str,
            n: &str,
            parent: Option<u64>,
        ) -> crate::gitlab::Result<GitLabGroup> {
            self.inner.create_group(p, n, parent).await
        }
        async fn create_project(&self, ns: u64, p: &str) -> crate::gitlab::Result<GitLabProject> {
            self.inner.create_project(ns, p).await
        }
    }

    #[tokio::test]
    async fn paginates_until_short_page() {
        let host = host_with(120);
        let executor = BatchQueryExecutor::new(host.clone(), BatchConfig::default());

        let projects = executor.query_projects(None).await.expect("listing");
        assert_eq!(projects.len(), 120);
        assert_eq!(host.call_count("list_projects"), 3);
    }

    #[tokio::test]
    async fn exact_multiple_needs_trailing_empty_page() {
        let host = host_with(100);
        let executor = BatchQueryExecutor::new(host.clone(), BatchConfig::default());

        let listing = executor.list_projects(None).await.expect("listing");
        assert_eq!(listing.projects.len(), 100);
        assert!(listing.complete);
        assert_eq!(host.call_count("list_projects"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_returns_partial_result() {
        let inner = host_with(500);
        let slow = Arc::new(FaultyHost {
            inner: inner.clone(),
            delay: Duration::from_secs(12),
            panic_branches_for: None,
        });
        let executor = BatchQueryExecutor::new(slow, BatchConfig::default());

        let listing = executor.list_projects(None).await.expect("partial listing");
        // Pages finish at 12s, 24s and 36s; the deadline is checked after each.
        assert_eq!(listing.projects.len(), 150);
        assert!(!listing.complete);
        assert_eq!(inner.call_count("list_projects"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_page_failure_is_retried() {
        let host = host_with(10);
        host.fail_next("list_projects", GitLabError::Network("reset".into()));
        host.fail_next("list_projects", GitLabError::Timeout("slow".into()));
        let executor = BatchQueryExecutor::new(host.clone(), BatchConfig::default());

        let started = Instant::now();
        let projects = executor.query_projects(None).await.expect("listing");
        assert_eq!(projects.len(), 10);
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_abort_the_listing() {
        let host = host_with(10);
        for _ in 0..4 {
            host.fail_next("list_projects", GitLabError::Auth("401: bad token".into()));
        }
        let executor = BatchQueryExecutor::new(host.clone(), BatchConfig::default());

        let err = executor.query_projects(None).await.expect_err("fatal");
        assert!(matches!(err, BatchError::QueryFailed { page: 1, .. }));
        assert_eq!(host.call_count("list_projects"), 4);
    }

    #[tokio::test]
    async fn panicking_detail_keeps_the_project() {
        let inner = host_with(2);
        inner.set_branches(1, vec![branch("main", "aaa")]);
        inner.set_branches(2, vec![branch("main", "bbb")]);
        let host = Arc::new(FaultyHost {
            inner,
            delay: Duration::ZERO,
            panic_branches_for: Some(1),
        });
        let executor = BatchQueryExecutor::new(host, BatchConfig::default());

        let enriched = executor.fetch_details(vec![project(1), project(2)]).await;

        let ids: Vec<u64> = enriched.iter().map(|e| e.project.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(enriched[0].detail.is_none());
        assert!(enriched[1].detail.is_some());
    }

    #[tokio::test]
    async fn detail_failures_are_isolated() {
        let host = host_with(3);
        host.set_branches(1, vec![branch("main", "aaa"), branch("dev", "bbb")]);
        host.set_branches(3, vec![branch("main", "ccc")]);
        let executor = BatchQueryExecutor::new(host.clone(), BatchConfig::default());

        let enriched = executor
            .fetch_details(vec![project(1), project(2), project(3)])
            .await;

        let ids: Vec<u64> = enriched.iter().map(|e| e.project.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let first = enriched[0].detail.as_ref().expect("detail for 1");
        assert_eq!(first.branches.len(), 2);
        assert_eq!(
            first.default_branch_commit.as_ref().map(|c| c.id.as_str()),
            Some("aaa")
        );
        // Project 2 has no `main` branch, so its default-branch lookup fails.
        assert!(enriched[1].detail.is_none());
        assert!(enriched[2].detail.is_some());
    }

    #[tokio::test]
    async fn lookup_maps_not_found_to_none() {
        let host = host_with(1);
        let executor = BatchQueryExecutor::new(host.clone(), BatchConfig::default());

        assert!(executor.lookup_project("team/p1").await.expect("ok").is_some());
        assert!(executor.lookup_project("team/gone").await.expect("ok").is_none());

        host.fail_next("get_project", GitLabError::Network("down".into()));
        assert!(executor.lookup_project("team/p1").await.is_err());
    }
}
