//! Sync executors: the layer that actually moves commits between hosts.
//!
//! The scheduler only sees [`SyncExecutor`]. An `Err` from an executor is
//! treated exactly like an unsuccessful [`SyncOutcome`].

mod push_mirror;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::entity::sync_task::TaskType;
use crate::gitlab::GitLabError;

pub use push_mirror::{PushMirrorExecutor, authenticated_url, strip_credentials};

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Display is the inner message so the failure classifier sees its keywords.
    #[error(transparent)]
    GitLab(#[from] GitLabError),

    #[error("Git operation failed: {0}")]
    Git(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No executor configured for {0} tasks")]
    NotConfigured(TaskType),
}

pub type Result<T> = std::result::Result<T, ExecutorError>;

/// One unit of work handed to an executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncRequest {
    pub task_id: Uuid,
    pub sync_project_id: Uuid,
    /// Source `path_with_namespace`; the target uses the same path.
    pub project_key: String,
    pub task_type: TaskType,
    /// Working copy for pull sync.
    pub local_repo_path: Option<String>,
    /// Set by a manual retry.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub success: bool,
    /// Head of the default branch after the sync, when known.
    pub final_sha: Option<String>,
    pub error: Option<String>,
}

impl SyncOutcome {
    pub fn succeeded(final_sha: Option<String>) -> Self {
        Self {
            success: true,
            final_sha,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            final_sha: None,
            error: Some(error.into()),
        }
    }
}

/// Performs the replication for one project.
#[async_trait]
pub trait SyncExecutor: Send + Sync {
    /// First sync of a project that has never run.
    async fn sync_first(&self, request: &SyncRequest) -> Result<SyncOutcome>;

    async fn sync_incremental(&self, request: &SyncRequest) -> Result<SyncOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gitlab_errors_keep_classifier_keywords() {
        let err = ExecutorError::from(GitLabError::Auth("401: invalid token".into()));
        assert_eq!(err.to_string(), "Authentication failed: 401: invalid token");
        assert_eq!(
            crate::scheduler::classify(&err.to_string()),
            crate::scheduler::ErrorType::AuthFailed
        );
    }

    #[test]
    fn outcome_constructors() {
        let ok = SyncOutcome::succeeded(Some("abc".into()));
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = SyncOutcome::failed("disk full");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("disk full"));
    }
}
