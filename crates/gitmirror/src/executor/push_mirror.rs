use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use super::{ExecutorError, Result, SyncExecutor, SyncOutcome, SyncRequest};
use crate::gitlab::{GitLabProject, RemoteMirror, RepositoryClient};

/// Clone URL for `project_key` on `host` carrying an access token.
pub fn authenticated_url(host: &str, token: Option<&str>, project_key: &str) -> Result<String> {
    let mut url = Url::parse(host)
        .map_err(|e| ExecutorError::InvalidInput(format!("invalid host URL {host}: {e}")))?;
    url.set_path(&format!("{}.git", project_key.trim_matches('/')));
    if let Some(token) = token {
        url.set_username("oauth2")
            .and_then(|()| url.set_password(Some(token)))
            .map_err(|()| ExecutorError::InvalidInput(format!("cannot set credentials on {host}")))?;
    }
    Ok(url.to_string())
}

/// The URL with any userinfo removed. Unparseable input is returned as is.
pub fn strip_credentials(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            let _ = parsed.set_username("");
            let _ = parsed.set_password(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

/// Replicates through the source host's push mirror.
///
/// Creates the target project (and any missing groups) when absent, then
/// makes sure a push mirror toward it exists and triggers an update.
pub struct PushMirrorExecutor {
    source: Arc<dyn RepositoryClient>,
    target: Arc<dyn RepositoryClient>,
    target_token: Option<String>,
}

impl std::fmt::Debug for PushMirrorExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushMirrorExecutor")
            .field("source", &self.source.host())
            .field("target", &self.target.host())
            .finish_non_exhaustive()
    }
}

impl PushMirrorExecutor {
    pub fn new(
        source: Arc<dyn RepositoryClient>,
        target: Arc<dyn RepositoryClient>,
        target_token: Option<String>,
    ) -> Self {
        Self {
            source,
            target,
            target_token,
        }
    }

    async fn ensure_target_project(&self, project_key: &str) -> Result<GitLabProject> {
        match self.target.get_project(project_key).await {
            Ok(project) => return Ok(project),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let (namespace, name) = project_key.rsplit_once('/').ok_or_else(|| {
            ExecutorError::InvalidInput(format!(
                "project key {project_key} has no namespace to create it in"
            ))
        })?;

        let mut parent_id = None;
        let mut full_path = String::new();
        for segment in namespace.split('/') {
            if !full_path.is_empty() {
                full_path.push('/');
            }
            full_path.push_str(segment);

            let group = match self.target.get_group(&full_path).await {
                Ok(group) => group,
                Err(e) if e.is_not_found() => {
                    tracing::info!(group = %full_path, "Creating target group");
                    self.target.create_group(segment, segment, parent_id).await?
                }
                Err(e) => return Err(e.into()),
            };
            parent_id = Some(group.id);
        }

        let namespace_id = parent_id.ok_or_else(|| {
            ExecutorError::InvalidInput(format!("project key {project_key} has an empty namespace"))
        })?;
        tracing::info!(project = %project_key, "Creating missing target project");
        Ok(self.target.create_project(namespace_id, name).await?)
    }

    async fn ensure_mirror(&self, source_id: u64, mirror_url: &str) -> Result<RemoteMirror> {
        let wanted = strip_credentials(mirror_url);
        let existing = self
            .source
            .list_mirrors(source_id)
            .await?
            .into_iter()
            .find(|m| strip_credentials(&m.url) == wanted);

        match existing {
            Some(mirror) => Ok(mirror),
            None => {
                tracing::info!(source_id, url = %wanted, "Creating push mirror");
                Ok(self.source.create_mirror(source_id, mirror_url).await?)
            }
        }
    }

    async fn run(&self, request: &SyncRequest) -> Result<SyncOutcome> {
        let source = self.source.get_project(&request.project_key).await?;
        self.ensure_target_project(&request.project_key).await?;

        let mirror_url = authenticated_url(
            self.target.host(),
            self.target_token.as_deref(),
            &request.project_key,
        )?;
        let mirror = self.ensure_mirror(source.id, &mirror_url).await?;
        self.source
            .trigger_mirror_sync(source.id, Some(mirror.id))
            .await?;

        let final_sha = match &source.default_branch {
            Some(branch) => match self.source.get_branch(source.id, branch).await {
                Ok(head) => head.commit.map(|c| c.id),
                Err(e) => {
                    tracing::warn!(
                        project = %request.project_key,
                        error = %e,
                        "Could not read default branch head"
                    );
                    None
                }
            },
            None => None,
        };

        tracing::debug!(
            project = %request.project_key,
            mirror_id = mirror.id,
            sha = ?final_sha,
            "Push mirror sync triggered"
        );
        Ok(SyncOutcome::succeeded(final_sha))
    }
}

#[async_trait]
impl SyncExecutor for PushMirrorExecutor {
    async fn sync_first(&self, request: &SyncRequest) -> Result<SyncOutcome> {
        tracing::info!(project = %request.project_key, "Setting up push mirror");
        self.run(request).await
    }

    async fn sync_incremental(&self, request: &SyncRequest) -> Result<SyncOutcome> {
        self.run(request).await
    }
}
