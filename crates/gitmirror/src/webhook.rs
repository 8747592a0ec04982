//! Push webhook handling.
//!
//! A push either initializes an unknown project, is debounced because the
//! project synced successfully a moment ago, or makes the project's task due
//! at the next dispatch tick.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::entity::sync_event::{EventSource, EventType};
use crate::entity::sync_project::SyncMethod;
use crate::entity::sync_task::{LastSyncStatus, Model as TaskModel, TaskType};
use crate::metrics::{self, MetricsSink};
use crate::store::{NewEvent, StoreError, event, project, task};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),
}

pub type Result<T> = std::result::Result<T, WebhookError>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// A push this soon after a successful sync is ignored.
    pub debounce_seconds: i64,
    /// Parent directory of working copies for auto-initialized projects.
    pub repos_dir: PathBuf,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            debounce_seconds: 120,
            repos_dir: PathBuf::from("repos"),
        }
    }
}

/// The subset of a GitLab push hook payload we act on.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PushEvent {
    pub project: PushProject,
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
    /// Head commit after the push.
    #[serde(rename = "after", default)]
    pub commit_sha: Option<String>,
    #[serde(rename = "total_commits_count", default)]
    pub commit_count: Option<i64>,
    #[serde(default)]
    pub user_username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PushProject {
    pub path_with_namespace: String,
    #[serde(default)]
    pub id: Option<u64>,
}

impl PushEvent {
    pub fn new(project_key: impl Into<String>) -> Self {
        Self {
            project: PushProject {
                path_with_namespace: project_key.into(),
                id: None,
            },
            git_ref: None,
            commit_sha: None,
            commit_count: None,
            user_username: None,
        }
    }

    #[must_use]
    pub fn with_commit(mut self, git_ref: &str, sha: &str, count: i64) -> Self {
        self.git_ref = Some(git_ref.to_string());
        self.commit_sha = Some(sha.to_string());
        self.commit_count = Some(count);
        self
    }

    pub fn project_key(&self) -> &str {
        self.project.path_with_namespace.trim().trim_matches('/')
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookDecision {
    /// The project was unknown; it now has a task due immediately.
    Initialized,
    /// The last successful sync is recent enough; nothing changed.
    Debounced,
    /// The task was made due now.
    Accepted,
}

impl WebhookDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            WebhookDecision::Initialized => "initialized",
            WebhookDecision::Debounced => "debounced",
            WebhookDecision::Accepted => "accepted",
        }
    }
}

impl std::fmt::Display for WebhookDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookOutcome {
    pub decision: WebhookDecision,
    pub project_key: String,
    pub sync_project_id: Uuid,
    pub task_id: Uuid,
    pub next_run_at: DateTime<Utc>,
}

/// Debounce decision for a task, independent of persistence.
pub fn should_debounce(task: &TaskModel, now: DateTime<Utc>, debounce_seconds: i64) -> bool {
    if task.last_sync_status != Some(LastSyncStatus::Success) {
        return false;
    }
    task.last_run_at
        .is_some_and(|last| last.with_timezone(&Utc) > now - Duration::seconds(debounce_seconds))
}

#[derive(Clone)]
pub struct WebhookGate {
    db: Arc<DatabaseConnection>,
    config: WebhookConfig,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for WebhookGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookGate")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WebhookGate {
    pub fn new(db: Arc<DatabaseConnection>, config: WebhookConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { db, config, metrics }
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    pub async fn handle_push(&self, push: &PushEvent, now: DateTime<Utc>) -> Result<WebhookOutcome> {
        let project_key = push.project_key();
        if project_key.is_empty() {
            return Err(WebhookError::InvalidPayload(
                "missing project.path_with_namespace".to_string(),
            ));
        }

        tracing::info!(
            project = project_key,
            git_ref = push.git_ref.as_deref().unwrap_or_default(),
            commits = push.commit_count.unwrap_or_default(),
            "Processing push webhook"
        );

        let (decision, current) = match self.find_task(project_key).await? {
            None => {
                let method = project::find_by_key(&self.db, project_key)
                    .await?
                    .map_or(SyncMethod::PullSync, |p| p.sync_method);
                let initialized =
                    project::initialize(&self.db, project_key, method, &self.config.repos_dir, now)
                        .await?;
                (WebhookDecision::Initialized, initialized.task)
            }
            Some(existing) if should_debounce(&existing, now, self.config.debounce_seconds) => {
                tracing::debug!(
                    project = project_key,
                    last_run_at = ?existing.last_run_at,
                    "Webhook debounced"
                );
                (WebhookDecision::Debounced, existing)
            }
            Some(existing) => {
                let due = task::reschedule(&self.db, existing.id, now).await?;
                tracing::info!(project = project_key, "Sync scheduled by webhook");
                (WebhookDecision::Accepted, due)
            }
        };

        self.record(push, &current, decision, now).await;
        metrics::record_webhook(self.metrics.as_ref(), decision.as_str());

        Ok(WebhookOutcome {
            decision,
            project_key: project_key.to_string(),
            sync_project_id: current.sync_project_id,
            task_id: current.id,
            next_run_at: current.next_run_at.with_timezone(&Utc),
        })
    }

    async fn find_task(&self, project_key: &str) -> Result<Option<TaskModel>> {
        let Some(project) = project::find_by_key(&self.db, project_key).await? else {
            return Ok(None);
        };
        let task_type = match project.sync_method {
            SyncMethod::PullSync => TaskType::Pull,
            SyncMethod::PushMirror => TaskType::Push,
        };
        Ok(task::find_by_project(&self.db, project.id, task_type).await?)
    }

    async fn record(&self, push: &PushEvent, task: &TaskModel, decision: WebhookDecision, now: DateTime<Utc>) {
        let message = match decision {
            WebhookDecision::Initialized => "Project initialized from webhook".to_string(),
            WebhookDecision::Debounced => format!(
                "Last successful sync within {}s",
                self.config.debounce_seconds
            ),
            WebhookDecision::Accepted => "Scheduled for immediate execution".to_string(),
        };

        let mut data = serde_json::Map::new();
        if let Some(count) = push.commit_count.filter(|c| *c > 0) {
            data.insert("commits_count".into(), count.into());
        }
        if let Some(user) = &push.user_username {
            data.insert("user".into(), user.clone().into());
        }

        event::record_best_effort(
            &self.db,
            NewEvent::new(
                task.sync_project_id,
                EventType::WebhookPush,
                EventSource::Webhook,
                decision.as_str(),
            )
            .git_ref(push.git_ref.clone())
            .commit_sha(push.commit_sha.clone())
            .message(message)
            .data(serde_json::Value::Object(data)),
            now,
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::entity::sync_task::TaskStatus;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn task(status: Option<LastSyncStatus>, last_run_secs_ago: Option<i64>) -> TaskModel {
        let now = base().fixed_offset();
        TaskModel {
            id: Uuid::new_v4(),
            sync_project_id: Uuid::new_v4(),
            task_type: TaskType::Pull,
            status: TaskStatus::Waiting,
            next_run_at: now,
            last_run_at: last_run_secs_ago.map(|s| now - Duration::seconds(s)),
            force_sync: false,
            last_sync_status: status,
            consecutive_failures: 0,
            error_type: None,
            error_message: None,
            last_commit_sha: None,
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn recent_success_is_debounced() {
        let t = task(Some(LastSyncStatus::Success), Some(60));
        assert!(should_debounce(&t, base(), 120));
    }

    #[test]
    fn old_success_is_not_debounced() {
        let t = task(Some(LastSyncStatus::Success), Some(120));
        assert!(!should_debounce(&t, base(), 120));
        let t = task(Some(LastSyncStatus::Success), Some(600));
        assert!(!should_debounce(&t, base(), 120));
    }

    #[test]
    fn failure_or_never_run_is_not_debounced() {
        assert!(!should_debounce(&task(Some(LastSyncStatus::Failed), Some(10)), base(), 120));
        assert!(!should_debounce(&task(None, None), base(), 120));
        assert!(!should_debounce(&task(Some(LastSyncStatus::Success), None), base(), 120));
    }

    #[test]
    fn parses_gitlab_push_payload() {
        let payload = serde_json::json!({
            "object_kind": "push",
            "ref": "refs/heads/main",
            "after": "abc123",
            "total_commits_count": 3,
            "user_username": "dev",
            "project": { "id": 42, "path_with_namespace": "team/app", "name": "app" }
        });
        let push: PushEvent = serde_json::from_value(payload).expect("valid payload");
        assert_eq!(push.project_key(), "team/app");
        assert_eq!(push.git_ref.as_deref(), Some("refs/heads/main"));
        assert_eq!(push.commit_sha.as_deref(), Some("abc123"));
        assert_eq!(push.commit_count, Some(3));
        assert_eq!(push.project.id, Some(42));
    }

    #[test]
    fn payload_without_project_is_rejected_by_serde() {
        let payload = serde_json::json!({ "ref": "refs/heads/main" });
        assert!(serde_json::from_value::<PushEvent>(payload).is_err());
    }

    #[cfg(all(feature = "sqlite", feature = "migrate"))]
    mod sqlite_tests {
        use super::*;
        use crate::db::connect_and_migrate;
        use crate::metrics::InMemorySink;
        use crate::scheduler::transition;

        async fn gate() -> (WebhookGate, Arc<DatabaseConnection>, Arc<InMemorySink>) {
            let db = Arc::new(connect_and_migrate("sqlite::memory:").await.expect("db"));
            let sink = Arc::new(InMemorySink::new());
            let gate = WebhookGate::new(db.clone(), WebhookConfig::default(), sink.clone());
            (gate, db, sink)
        }

        #[tokio::test]
        async fn unknown_project_is_initialized_due_now() {
            let (gate, db, sink) = gate().await;
            let push = PushEvent::new("team/app").with_commit("refs/heads/main", "abc", 1);

            let outcome = gate.handle_push(&push, base()).await.expect("handled");
            assert_eq!(outcome.decision, WebhookDecision::Initialized);
            assert_eq!(outcome.next_run_at, base());

            let config = project::find_config(&db, outcome.sync_project_id)
                .await
                .expect("query")
                .expect("config");
            assert!(config.local_repo_path.ends_with("team/app"));

            let events = event::list_for_project(&db, outcome.sync_project_id, 10)
                .await
                .expect("events");
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].status, "initialized");
            assert_eq!(events[0].commit_sha.as_deref(), Some("abc"));
            assert_eq!(
                sink.counter_value("gitmirror_webhook_events_total{decision=initialized}"),
                Some(1)
            );
        }

        #[tokio::test]
        async fn push_after_recent_success_is_debounced() {
            let (gate, db, _) = gate().await;
            let first = gate
                .handle_push(&PushEvent::new("team/app"), base())
                .await
                .expect("init");
            let current = task::find_by_id(&db, first.task_id).await.expect("query").expect("task");
            let synced = transition::on_success(
                &transition::start(&current, base()),
                base(),
                Duration::minutes(120),
                None,
            );
            task::save(&db, synced).await.expect("save");

            let later = base() + Duration::seconds(30);
            let outcome = gate
                .handle_push(&PushEvent::new("team/app"), later)
                .await
                .expect("handled");
            assert_eq!(outcome.decision, WebhookDecision::Debounced);
            assert_eq!(outcome.next_run_at, base() + Duration::minutes(120));
        }

        #[tokio::test]
        async fn push_outside_window_makes_task_due() {
            let (gate, db, _) = gate().await;
            let first = gate
                .handle_push(&PushEvent::new("team/app"), base())
                .await
                .expect("init");
            let current = task::find_by_id(&db, first.task_id).await.expect("query").expect("task");
            let synced = transition::on_success(
                &transition::start(&current, base()),
                base(),
                Duration::minutes(120),
                None,
            );
            task::save(&db, synced).await.expect("save");

            let later = base() + Duration::minutes(10);
            let outcome = gate
                .handle_push(&PushEvent::new("team/app"), later)
                .await
                .expect("handled");
            assert_eq!(outcome.decision, WebhookDecision::Accepted);
            assert_eq!(outcome.next_run_at, later);
        }

        #[tokio::test]
        async fn empty_project_key_is_invalid() {
            let (gate, _, _) = gate().await;
            let err = gate
                .handle_push(&PushEvent::new(" / "), base())
                .await
                .expect_err("invalid");
            assert!(matches!(err, WebhookError::InvalidPayload(_)));
        }
    }
}
