//! Repository API client trait and its GitLab REST implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::de::DeserializeOwned;

use super::error::GitLabError;
use super::rate_limit::ApiRateLimiter;
use super::types::{
    GitLabBranch, GitLabGroup, GitLabHostConfig, GitLabProject, ListProjectsQuery, RemoteMirror,
};
use crate::http::{HttpMethod, HttpRequest, HttpTransport, ReqwestTransport};

pub type Result<T> = std::result::Result<T, GitLabError>;

/// Operations the mirror service needs from a GitLab-compatible host.
///
/// Implemented by [`GitLabClient`]; tests substitute in-memory fakes.
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Base URL of the host, without trailing slash.
    fn host(&self) -> &str;

    async fn list_projects(&self, query: &ListProjectsQuery) -> Result<Vec<GitLabProject>>;

    /// Look up a project by numeric id or full path.
    async fn get_project(&self, id_or_path: &str) -> Result<GitLabProject>;

    async fn list_branches(&self, project_id: u64) -> Result<Vec<GitLabBranch>>;

    async fn get_branch(&self, project_id: u64, branch: &str) -> Result<GitLabBranch>;

    async fn list_mirrors(&self, project_id: u64) -> Result<Vec<RemoteMirror>>;

    async fn create_mirror(&self, project_id: u64, url: &str) -> Result<RemoteMirror>;

    /// Trigger a push-mirror update, or a pull-mirror update when `mirror_id` is `None`.
    async fn trigger_mirror_sync(&self, project_id: u64, mirror_id: Option<u64>) -> Result<()>;

    async fn get_group(&self, full_path: &str) -> Result<GitLabGroup>;

    async fn create_group(
        &self,
        path: &str,
        name: &str,
        parent_id: Option<u64>,
    ) -> Result<GitLabGroup>;

    async fn create_project(&self, namespace_id: u64, path: &str) -> Result<GitLabProject>;
}

/// GitLab REST v4 client.
#[derive(Clone)]
pub struct GitLabClient {
    transport: Arc<dyn HttpTransport>,
    host: String,
    token: Option<String>,
    limiter: Option<ApiRateLimiter>,
}

impl std::fmt::Debug for GitLabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitLabClient")
            .field("host", &self.host)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

/// Percent-encode a path segment (`group/project` -> `group%2Fproject`).
fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Normalize a host setting into a base URL.
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

impl GitLabClient {
    pub fn new(
        host: &str,
        token: Option<String>,
        transport: Arc<dyn HttpTransport>,
        limiter: Option<ApiRateLimiter>,
    ) -> Self {
        Self {
            transport,
            host: normalize_host(host),
            token,
            limiter,
        }
    }

    /// Build a client with a reqwest transport from host settings.
    pub fn from_config(config: &GitLabHostConfig) -> Result<Self> {
        let transport = ReqwestTransport::with_timeout(Duration::from_secs(
            config.request_timeout_secs.max(1),
        ))?;
        Ok(Self::new(
            &config.host,
            config.token.clone(),
            Arc::new(transport),
            ApiRateLimiter::from_config(config.requests_per_second),
        ))
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v4{}", self.host, path)
    }

    /// Full URL for one page of the project listing.
    pub(crate) fn list_projects_url(&self, query: &ListProjectsQuery) -> String {
        let base = match &query.group_path {
            Some(group) => self.api_url(&format!("/groups/{}/projects", encode_segment(group))),
            None => self.api_url("/projects"),
        };

        let mut params = url::form_urlencoded::Serializer::new(String::new());
        params
            .append_pair("page", &query.page.to_string())
            .append_pair("per_page", &query.per_page.to_string())
            .append_pair("statistics", "true");
        if query.group_path.is_some() {
            params.append_pair("include_subgroups", "true");
        } else {
            params.append_pair("membership", "true");
        }
        if let Some(after) = query.updated_after {
            params
                .append_pair(
                    "updated_after",
                    &after.to_rfc3339_opts(SecondsFormat::Secs, true),
                )
                .append_pair("order_by", "updated_at");
        }

        format!("{}?{}", base, params.finish())
    }

    fn request(&self, method: HttpMethod, url: String) -> HttpRequest {
        let req = HttpRequest::new(method, url).header("Accept", "application/json");
        match &self.token {
            Some(token) => req.header("PRIVATE-TOKEN", token.as_str()),
            None => req,
        }
    }

    async fn execute(&self, request: HttpRequest) -> Result<crate::http::HttpResponse> {
        if let Some(limiter) = &self.limiter {
            limiter.wait().await;
        }

        tracing::trace!(method = request.method.as_str(), url = %request.url, "GitLab request");
        let response = self.transport.send(request).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(GitLabError::from_status(response.status, &response.text()))
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T> {
        let response = self.execute(request).await?;
        Ok(response.json()?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json(self.request(HttpMethod::Get, self.api_url(path)))
            .await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let request = self
            .request(HttpMethod::Post, self.api_url(path))
            .json(body)?;
        self.send_json(request).await
    }
}

const BRANCH_PAGE_SIZE: usize = 100;

/// Page to fetch after `page`, from GitLab's `X-Next-Page` header.
///
/// The header is empty on the last page. Without it (large result sets), a
/// full page is taken to mean more may follow.
fn next_page(header: Option<&str>, page: u32, fetched: usize) -> Option<u32> {
    match header.map(str::trim) {
        Some("") => None,
        Some(value) => value.parse::<u32>().ok().filter(|next| *next > page),
        None if fetched >= BRANCH_PAGE_SIZE => Some(page + 1),
        None => None,
    }
}

#[async_trait]
impl RepositoryClient for GitLabClient {
    fn host(&self) -> &str {
        &self.host
    }

    async fn list_projects(&self, query: &ListProjectsQuery) -> Result<Vec<GitLabProject>> {
        let url = self.list_projects_url(query);
        self.send_json(self.request(HttpMethod::Get, url)).await
    }

    async fn get_project(&self, id_or_path: &str) -> Result<GitLabProject> {
        self.get_json(&format!(
            "/projects/{}?statistics=true",
            encode_segment(id_or_path)
        ))
        .await
    }

    async fn list_branches(&self, project_id: u64) -> Result<Vec<GitLabBranch>> {
        let mut branches = Vec::new();
        let mut page = 1;
        loop {
            let url = self.api_url(&format!(
                "/projects/{project_id}/repository/branches?per_page={BRANCH_PAGE_SIZE}&page={page}"
            ));
            let response = self.execute(self.request(HttpMethod::Get, url)).await?;
            let batch: Vec<GitLabBranch> = response.json()?;
            let fetched = batch.len();
            branches.extend(batch);

            match next_page(response.header("x-next-page"), page, fetched) {
                Some(next) => page = next,
                None => break,
            }
        }
        Ok(branches)
    }

    async fn get_branch(&self, project_id: u64, branch: &str) -> Result<GitLabBranch> {
        self.get_json(&format!(
            "/projects/{}/repository/branches/{}",
            project_id,
            encode_segment(branch)
        ))
        .await
    }

    async fn list_mirrors(&self, project_id: u64) -> Result<Vec<RemoteMirror>> {
        self.get_json(&format!("/projects/{project_id}/remote_mirrors"))
            .await
    }

    async fn create_mirror(&self, project_id: u64, url: &str) -> Result<RemoteMirror> {
        self.post_json(
            &format!("/projects/{project_id}/remote_mirrors"),
            &serde_json::json!({
                "url": url,
                "enabled": true,
                "only_protected_branches": false,
                "keep_divergent_refs": false,
            }),
        )
        .await
    }

    async fn trigger_mirror_sync(&self, project_id: u64, mirror_id: Option<u64>) -> Result<()> {
        let path = match mirror_id {
            Some(id) => format!("/projects/{project_id}/remote_mirrors/{id}/sync"),
            None => format!("/projects/{project_id}/mirror/pull"),
        };
        self.execute(self.request(HttpMethod::Post, self.api_url(&path)))
            .await?;
        Ok(())
    }

    async fn get_group(&self, full_path: &str) -> Result<GitLabGroup> {
        self.get_json(&format!("/groups/{}", encode_segment(full_path)))
            .await
    }

    async fn create_group(
        &self,
        path: &str,
        name: &str,
        parent_id: Option<u64>,
    ) -> Result<GitLabGroup> {
        let mut body = serde_json::json!({ "path": path, "name": name, "visibility": "private" });
        if let Some(parent) = parent_id {
            body["parent_id"] = serde_json::json!(parent);
        }
        self.post_json("/groups", &body).await
    }

    async fn create_project(&self, namespace_id: u64, path: &str) -> Result<GitLabProject> {
        self.post_json(
            "/projects",
            &serde_json::json!({
                "namespace_id": namespace_id,
                "path": path,
                "name": path,
                "visibility": "private",
                "initialize_with_readme": false,
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::http::{HttpError, MockTransport, header_get};

    const HOST: &str = "https://git.example.com";

    fn client(transport: &MockTransport) -> GitLabClient {
        GitLabClient::new(
            "git.example.com/",
            Some("glpat-test".to_string()),
            Arc::new(transport.clone()),
            None,
        )
    }

    fn project_json(id: u64, path: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": path,
            "path": path,
            "path_with_namespace": format!("team/{path}"),
            "default_branch": "main",
            "last_activity_at": "2025-03-01T10:00:00Z",
            "http_url_to_repo": format!("{HOST}/team/{path}.git"),
            "namespace": {"id": 3, "full_path": "team"},
            "statistics": {"commit_count": 10, "repository_size": 1000}
        })
    }

    #[test]
    fn normalizes_host_into_base_url() {
        assert_eq!(normalize_host("gitlab.com"), "https://gitlab.com");
        assert_eq!(
            normalize_host("http://localhost:8080/"),
            "http://localhost:8080"
        );
    }

    #[test]
    fn encodes_paths_as_single_segment() {
        assert_eq!(encode_segment("team/sub/app"), "team%2Fsub%2Fapp");
        assert_eq!(encode_segment("feature/a b"), "feature%2Fa%20b");
    }

    #[test]
    fn list_url_requests_statistics_and_membership() {
        let transport = MockTransport::new();
        let url = client(&transport).list_projects_url(&ListProjectsQuery {
            group_path: None,
            updated_after: None,
            page: 2,
            per_page: 50,
        });
        assert_eq!(
            url,
            format!("{HOST}/api/v4/projects?page=2&per_page=50&statistics=true&membership=true")
        );
    }

    #[test]
    fn list_url_orders_by_update_when_filtering() {
        let transport = MockTransport::new();
        let after = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).single().expect("valid date");
        let url = client(&transport).list_projects_url(&ListProjectsQuery {
            group_path: Some("team/sub".to_string()),
            updated_after: Some(after),
            page: 1,
            per_page: 20,
        });
        assert!(url.starts_with(&format!("{HOST}/api/v4/groups/team%2Fsub/projects?")));
        assert!(url.contains("updated_after=2025-01-02T03%3A04%3A05Z"));
        assert!(url.contains("order_by=updated_at"));
        assert!(url.contains("include_subgroups=true"));
    }

    #[tokio::test]
    async fn list_projects_sends_token_and_parses_page() {
        let transport = MockTransport::new();
        let c = client(&transport);
        let query = ListProjectsQuery {
            group_path: None,
            updated_after: None,
            page: 1,
            per_page: 2,
        };
        transport.push_json(
            HttpMethod::Get,
            c.list_projects_url(&query),
            200,
            json!([project_json(1, "a"), project_json(2, "b")]),
        );

        let projects = c.list_projects(&query).await.expect("page");
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[1].path_with_namespace, "team/b");

        let sent = transport.requests();
        assert_eq!(header_get(&sent[0].headers, "private-token"), Some("glpat-test"));
    }

    #[tokio::test]
    async fn get_project_maps_404_to_not_found() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            format!("{HOST}/api/v4/projects/team%2Fgone?statistics=true"),
            404,
            json!({"message": "404 Project Not Found"}),
        );

        let err = client(&transport)
            .get_project("team/gone")
            .await
            .expect_err("missing project");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn get_branch_returns_head_commit() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            format!("{HOST}/api/v4/projects/9/repository/branches/release%2F1.0"),
            200,
            json!({"name": "release/1.0", "default": false, "commit": {"id": "abc123", "committed_date": null}}),
        );

        let branch = client(&transport)
            .get_branch(9, "release/1.0")
            .await
            .expect("branch");
        assert_eq!(branch.commit.map(|c| c.id), Some("abc123".to_string()));
    }

    fn branches_json(from: usize, to: usize) -> serde_json::Value {
        (from..to)
            .map(|i| json!({"name": format!("feature/{i}"), "default": i == 0, "commit": null}))
            .collect()
    }

    #[tokio::test]
    async fn list_branches_follows_next_page_header() {
        let transport = MockTransport::new();
        let url = |page: u32| {
            format!("{HOST}/api/v4/projects/9/repository/branches?per_page=100&page={page}")
        };
        transport.push_json_with_headers(
            HttpMethod::Get,
            url(1),
            &[("X-Next-Page", "2")],
            branches_json(0, 100),
        );
        transport.push_json_with_headers(
            HttpMethod::Get,
            url(2),
            &[("X-Next-Page", "")],
            branches_json(100, 150),
        );

        let branches = client(&transport).list_branches(9).await.expect("branches");
        assert_eq!(branches.len(), 150);
        assert_eq!(branches[149].name, "feature/149");
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn list_branches_without_header_stops_on_short_page() {
        let transport = MockTransport::new();
        let url = |page: u32| {
            format!("{HOST}/api/v4/projects/9/repository/branches?per_page=100&page={page}")
        };
        transport.push_json(HttpMethod::Get, url(1), 200, branches_json(0, 100));
        transport.push_json(HttpMethod::Get, url(2), 200, branches_json(100, 120));

        let branches = client(&transport).list_branches(9).await.expect("branches");
        assert_eq!(branches.len(), 120);
    }

    #[test]
    fn next_page_reads_gitlab_header() {
        assert_eq!(next_page(Some("3"), 2, 100), Some(3));
        assert_eq!(next_page(Some(""), 2, 100), None);
        assert_eq!(next_page(Some("1"), 2, 100), None);
        assert_eq!(next_page(None, 2, 100), Some(3));
        assert_eq!(next_page(None, 2, 40), None);
    }

    #[tokio::test]
    async fn create_mirror_posts_target_url() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Post,
            format!("{HOST}/api/v4/projects/5/remote_mirrors"),
            201,
            json!({"id": 77, "url": "https://target.example.com/team/a.git", "enabled": true,
                   "update_status": "none", "last_successful_update_at": null, "last_error": null}),
        );

        let mirror = client(&transport)
            .create_mirror(5, "https://target.example.com/team/a.git")
            .await
            .expect("mirror");
        assert_eq!(mirror.id, 77);

        let body: serde_json::Value =
            serde_json::from_slice(&transport.requests()[0].body).expect("json body");
        assert_eq!(body["url"], "https://target.example.com/team/a.git");
        assert_eq!(body["enabled"], true);
    }

    #[tokio::test]
    async fn trigger_mirror_sync_accepts_empty_body() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Post,
            format!("{HOST}/api/v4/projects/5/remote_mirrors/77/sync"),
            204,
            json!(null),
        );

        client(&transport)
            .trigger_mirror_sync(5, Some(77))
            .await
            .expect("trigger");
    }

    #[tokio::test]
    async fn transport_timeout_surfaces_as_timeout() {
        let transport = MockTransport::new();
        transport.push_error(
            HttpMethod::Get,
            format!("{HOST}/api/v4/projects/5/remote_mirrors"),
            HttpError::Timeout("operation timed out".into()),
        );

        let err = client(&transport)
            .list_mirrors(5)
            .await
            .expect_err("timeout");
        assert!(matches!(err, GitLabError::Timeout(_)));
    }
}
