//! Operator actions on a project's tasks.

use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;

use super::{Result, SchedulerError, transition};
use crate::entity::sync_event::{EventSource, EventType};
use crate::entity::sync_task::Model;
use crate::store::{NewEvent, event, project, task};

/// Make every task of `project_key` due now, whatever its state.
///
/// Failure counts are kept; the next run is flagged as forced.
pub async fn retry_project(
    db: &DatabaseConnection,
    project_key: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Model>> {
    let project = project::get_by_key(db, project_key).await?;
    let tasks = task::find_all_for_project(db, project.id).await?;
    if tasks.is_empty() {
        return Err(SchedulerError::NoTasks(project.project_key));
    }

    let mut updated = Vec::with_capacity(tasks.len());
    for current in &tasks {
        updated.push(task::save(db, transition::manual_retry(current, now)).await?);
    }

    event::record_best_effort(
        db,
        NewEvent::new(
            project.id,
            EventType::ManualRetry,
            EventSource::Operator,
            "scheduled",
        )
        .message(format!("Manual retry of {} task(s)", updated.len()))
        .data(serde_json::json!({
            "previous_status": tasks.iter().map(|t| t.status.to_string()).collect::<Vec<_>>(),
        })),
        now,
    )
    .await;

    tracing::info!(project = %project.project_key, tasks = updated.len(), "Manual retry scheduled");
    Ok(updated)
}

/// Clear failure history of every task of `project_key` and re-enable it.
pub async fn reset_project(
    db: &DatabaseConnection,
    project_key: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Model>> {
    let project = project::get_by_key(db, project_key).await?;
    let tasks = task::find_all_for_project(db, project.id).await?;
    if tasks.is_empty() {
        return Err(SchedulerError::NoTasks(project.project_key));
    }

    let config_disabled = project::find_config(db, project.id)
        .await?
        .is_some_and(|c| !c.enabled);
    let reenabled = !project.enabled || config_disabled;
    if reenabled {
        project::set_enabled(db, project.id, true, now).await?;
    }

    let previous_failures: i32 = tasks.iter().map(|t| t.consecutive_failures).sum();
    let mut updated = Vec::with_capacity(tasks.len());
    for current in &tasks {
        updated.push(task::save(db, transition::reset_failures(current, now)).await?);
    }

    event::record_best_effort(
        db,
        NewEvent::new(
            project.id,
            EventType::ResetFailures,
            EventSource::Operator,
            "reset",
        )
        .message(format!("Cleared {previous_failures} consecutive failure(s)"))
        .data(serde_json::json!({
            "previous_failures": previous_failures,
            "reenabled": reenabled,
        })),
        now,
    )
    .await;

    tracing::info!(
        project = %project.project_key,
        previous_failures,
        reenabled,
        "Reset task failures"
    );
    Ok(updated)
}
