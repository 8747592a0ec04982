//! In-memory [`RepositoryClient`] for tests and dry runs.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::client::{RepositoryClient, Result};
use super::error::GitLabError;
use super::types::{
    GitLabBranch, GitLabGroup, GitLabNamespace, GitLabProject, ListProjectsQuery, RemoteMirror,
};

#[derive(Debug, Default)]
struct State {
    projects: BTreeMap<u64, GitLabProject>,
    branches: HashMap<u64, Vec<GitLabBranch>>,
    mirrors: HashMap<u64, Vec<RemoteMirror>>,
    groups: BTreeMap<String, GitLabGroup>,
    next_id: u64,
    failures: HashMap<&'static str, VecDeque<GitLabError>>,
    calls: Vec<String>,
    mirror_syncs: Vec<(u64, Option<u64>)>,
}

impl State {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn enter(&mut self, op: &'static str, detail: String) -> Result<()> {
        self.calls.push(format!("{op} {detail}"));
        match self.failures.get_mut(op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn project_by_path(&self, path: &str) -> Option<&GitLabProject> {
        self.projects
            .values()
            .find(|p| p.path_with_namespace == path)
    }
}

/// A GitLab host held entirely in memory.
///
/// Queued failures (see [`InMemoryGitLab::fail_next`]) are returned by the
/// next calls of the named operation, in order.
#[derive(Debug)]
pub struct InMemoryGitLab {
    host: String,
    state: Mutex<State>,
}

impl InMemoryGitLab {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            state: Mutex::new(State {
                next_id: 1000,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a project.
    pub fn insert_project(&self, project: GitLabProject) {
        self.state().projects.insert(project.id, project);
    }

    pub fn remove_project(&self, project_id: u64) {
        self.state().projects.remove(&project_id);
    }

    pub fn set_branches(&self, project_id: u64, branches: Vec<GitLabBranch>) {
        self.state().branches.insert(project_id, branches);
    }

    /// Queue an error for the next call of `op` (e.g. `"list_projects"`).
    pub fn fail_next(&self, op: &'static str, err: GitLabError) {
        self.state().failures.entry(op).or_default().push_back(err);
    }

    /// Every call made so far, as `"<op> <detail>"`.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        let prefix = format!("{op} ");
        self.state()
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    pub fn mirrors(&self, project_id: u64) -> Vec<RemoteMirror> {
        self.state()
            .mirrors
            .get(&project_id)
            .cloned()
            .unwrap_or_default()
    }

    /// `(project_id, mirror_id)` of every triggered mirror sync.
    pub fn mirror_syncs(&self) -> Vec<(u64, Option<u64>)> {
        self.state().mirror_syncs.clone()
    }

    pub fn find_project(&self, path: &str) -> Option<GitLabProject> {
        self.state().project_by_path(path).cloned()
    }

    pub fn project_count(&self) -> usize {
        self.state().projects.len()
    }
}

#[async_trait]
impl RepositoryClient for InMemoryGitLab {
    fn host(&self) -> &str {
        &self.host
    }

    async fn list_projects(&self, query: &ListProjectsQuery) -> Result<Vec<GitLabProject>> {
        let mut state = self.state();
        state.enter("list_projects", format!("page={}", query.page))?;

        let per_page = query.per_page.max(1) as usize;
        let skip = (query.page.max(1) as usize - 1) * per_page;

        let group_prefix = query.group_path.as_ref().map(|g| format!("{g}/"));
        let mut matching: Vec<&GitLabProject> = state
            .projects
            .values()
            .filter(|p| {
                group_prefix
                    .as_ref()
                    .is_none_or(|prefix| p.path_with_namespace.starts_with(prefix.as_str()))
            })
            .filter(|p| match query.updated_after {
                Some(after) => p.last_activity_at.is_some_and(|t| t > after),
                None => true,
            })
            .collect();
        if query.updated_after.is_some() {
            matching.sort_by_key(|p| std::cmp::Reverse(p.last_activity_at));
        }

        Ok(matching
            .into_iter()
            .skip(skip)
            .take(per_page)
            .cloned()
            .collect())
    }

    async fn get_project(&self, id_or_path: &str) -> Result<GitLabProject> {
        let mut state = self.state();
        state.enter("get_project", id_or_path.to_string())?;

        let found = match id_or_path.parse::<u64>() {
            Ok(id) => state.projects.get(&id),
            Err(_) => state.project_by_path(id_or_path),
        };
        found
            .cloned()
            .ok_or_else(|| GitLabError::NotFound(format!("project {id_or_path}")))
    }

    async fn list_branches(&self, project_id: u64) -> Result<Vec<GitLabBranch>> {
        let mut state = self.state();
        state.enter("list_branches", project_id.to_string())?;
        if !state.projects.contains_key(&project_id) {
            return Err(GitLabError::NotFound(format!("project {project_id}")));
        }
        Ok(state.branches.get(&project_id).cloned().unwrap_or_default())
    }

    async fn get_branch(&self, project_id: u64, branch: &str) -> Result<GitLabBranch> {
        let mut state = self.state();
        state.enter("get_branch", format!("{project_id}/{branch}"))?;
        state
            .branches
            .get(&project_id)
            .and_then(|branches| branches.iter().find(|b| b.name == branch))
            .cloned()
            .ok_or_else(|| GitLabError::NotFound(format!("branch {branch}")))
    }

    async fn list_mirrors(&self, project_id: u64) -> Result<Vec<RemoteMirror>> {
        let mut state = self.state();
        state.enter("list_mirrors", project_id.to_string())?;
        Ok(state.mirrors.get(&project_id).cloned().unwrap_or_default())
    }

    async fn create_mirror(&self, project_id: u64, url: &str) -> Result<RemoteMirror> {
        let mut state = self.state();
        state.enter("create_mirror", format!("{project_id} {url}"))?;
        let mirror = RemoteMirror {
            id: state.allocate_id(),
            url: url.to_string(),
            enabled: true,
            update_status: Some("none".to_string()),
            last_successful_update_at: None,
            last_error: None,
        };
        state
            .mirrors
            .entry(project_id)
            .or_default()
            .push(mirror.clone());
        Ok(mirror)
    }

    async fn trigger_mirror_sync(&self, project_id: u64, mirror_id: Option<u64>) -> Result<()> {
        let mut state = self.state();
        state.enter("trigger_mirror_sync", project_id.to_string())?;
        state.mirror_syncs.push((project_id, mirror_id));
        Ok(())
    }

    async fn get_group(&self, full_path: &str) -> Result<GitLabGroup> {
        let mut state = self.state();
        state.enter("get_group", full_path.to_string())?;
        state
            .groups
            .get(full_path)
            .cloned()
            .ok_or_else(|| GitLabError::NotFound(format!("group {full_path}")))
    }

    async fn create_group(
        &self,
        path: &str,
        name: &str,
        parent_id: Option<u64>,
    ) -> Result<GitLabGroup> {
        let mut state = self.state();
        state.enter("create_group", path.to_string())?;

        let parent_path = parent_id.and_then(|id| {
            state
                .groups
                .values()
                .find(|g| g.id == id)
                .map(|g| g.full_path.clone())
        });
        let full_path = match parent_path {
            Some(parent) => format!("{parent}/{path}"),
            None => path.to_string(),
        };
        let group = GitLabGroup {
            id: state.allocate_id(),
            name: name.to_string(),
            full_path: full_path.clone(),
        };
        state.groups.insert(full_path, group.clone());
        Ok(group)
    }

    async fn create_project(&self, namespace_id: u64, path: &str) -> Result<GitLabProject> {
        let mut state = self.state();
        state.enter("create_project", format!("{namespace_id}/{path}"))?;

        let namespace = state
            .groups
            .values()
            .find(|g| g.id == namespace_id)
            .map(|g| g.full_path.clone())
            .ok_or_else(|| GitLabError::NotFound(format!("namespace {namespace_id}")))?;

        let path_with_namespace = format!("{namespace}/{path}");
        if state.project_by_path(&path_with_namespace).is_some() {
            return Err(GitLabError::Api {
                status: 400,
                message: "has already been taken".to_string(),
            });
        }

        let project = GitLabProject {
            id: state.allocate_id(),
            name: path.to_string(),
            path: path.to_string(),
            http_url_to_repo: Some(format!("{}/{path_with_namespace}.git", self.host)),
            path_with_namespace,
            default_branch: None,
            last_activity_at: None,
            namespace: Some(GitLabNamespace {
                id: namespace_id,
                full_path: namespace,
            }),
            statistics: None,
            archived: false,
            empty_repo: true,
        };
        state.projects.insert(project.id, project.clone());
        Ok(project)
    }
}
