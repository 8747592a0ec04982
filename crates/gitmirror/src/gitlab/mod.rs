//! GitLab REST client used for both the source and the target host.
//!
//! # Module Structure
//!
//! - [`client`] - the [`RepositoryClient`] seam and the REST implementation
//! - [`error`] - typed API errors
//! - [`types`] - JSON payloads and host configuration
//! - [`rate_limit`] - proactive per-host throttling
//! - [`memory`] - an in-memory host for tests and dry runs
//!
//! ```ignore
//! use gitmirror::gitlab::{GitLabClient, GitLabHostConfig, RepositoryClient};
//!
//! let source = GitLabClient::from_config(&GitLabHostConfig {
//!     host: "gitlab.internal".into(),
//!     token: Some(token),
//!     ..Default::default()
//! })?;
//! let project = source.get_project("platform/api").await?;
//! ```

mod client;
mod error;
pub mod memory;
mod rate_limit;
mod types;

pub use client::{GitLabClient, RepositoryClient, Result};
pub use error::{GitLabError, is_rate_limit_error};
pub use memory::InMemoryGitLab;
pub use rate_limit::{ApiRateLimiter, DEFAULT_RPS};
pub use types::{
    BranchCommit, GitLabBranch, GitLabGroup, GitLabHostConfig, GitLabNamespace, GitLabProject,
    ListProjectsQuery, ProjectStatistics, RemoteMirror,
};
