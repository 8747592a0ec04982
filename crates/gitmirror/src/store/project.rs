use std::path::Path;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

use crate::entity::pull_sync_config::{
    self, Entity as PullSyncConfig, Model as PullSyncConfigModel, Priority,
};
use crate::entity::sync_project::{ActiveModel, Column, Entity as SyncProject, Model, SyncMethod};
use crate::entity::sync_task::{Model as SyncTaskModel, TaskType};

use super::errors::{Result, StoreError};
use super::task;

/// A project together with the records auto-initialization guarantees.
#[derive(Debug, Clone)]
pub struct InitializedProject {
    pub project: Model,
    pub config: PullSyncConfigModel,
    pub task: SyncTaskModel,
    /// Whether the project row was created by this call.
    pub created: bool,
}

// ─── Projects ────────────────────────────────────────────────────────────────

pub async fn find_by_id(db: &DatabaseConnection, id: Uuid) -> Result<Option<Model>> {
    SyncProject::find_by_id(id)
        .one(db)
        .await
        .map_err(StoreError::from)
}

/// Find a project by its source `path_with_namespace`.
pub async fn find_by_key(db: &DatabaseConnection, project_key: &str) -> Result<Option<Model>> {
    SyncProject::find()
        .filter(Column::ProjectKey.eq(project_key))
        .one(db)
        .await
        .map_err(StoreError::from)
}

/// Like [`find_by_key`], but a missing project is an error.
pub async fn get_by_key(db: &DatabaseConnection, project_key: &str) -> Result<Model> {
    find_by_key(db, project_key)
        .await?
        .ok_or_else(|| StoreError::not_found_by_key("sync_project", project_key))
}

pub async fn list(db: &DatabaseConnection) -> Result<Vec<Model>> {
    SyncProject::find()
        .order_by_asc(Column::ProjectKey)
        .all(db)
        .await
        .map_err(StoreError::from)
}

/// Return the project for `project_key`, creating it if absent.
///
/// Concurrent callers race on the unique `project_key` index; the loser's
/// insert is a no-op and both re-read the same row. The returned flag is
/// true only for the caller whose insert landed.
pub async fn ensure(
    db: &DatabaseConnection,
    project_key: &str,
    sync_method: SyncMethod,
    now: DateTime<Utc>,
) -> Result<(Model, bool)> {
    let project_key = validate_key(project_key)?;

    if let Some(existing) = find_by_key(db, project_key).await? {
        return Ok((existing, false));
    }

    let now = now.fixed_offset();
    let model = ActiveModel {
        id: Set(Uuid::new_v4()),
        project_key: Set(project_key.to_string()),
        sync_method: Set(sync_method),
        enabled: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let inserted = SyncProject::insert(model)
        .on_conflict(
            OnConflict::column(Column::ProjectKey)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    let project = get_by_key(db, project_key).await?;
    Ok((project, inserted > 0))
}

fn validate_key(project_key: &str) -> Result<&str> {
    let trimmed = project_key.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(StoreError::invalid_input("Missing required field: project_key"));
    }
    Ok(trimmed)
}

/// Enable or disable a project and its pull config.
pub async fn set_enabled(
    db: &DatabaseConnection,
    project_id: Uuid,
    enabled: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let now = now.fixed_offset();

    let result = SyncProject::update_many()
        .col_expr(Column::Enabled, Expr::value(enabled))
        .col_expr(Column::UpdatedAt, Expr::value(now))
        .filter(Column::Id.eq(project_id))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(StoreError::not_found_by_id("sync_project", project_id));
    }

    PullSyncConfig::update_many()
        .col_expr(pull_sync_config::Column::Enabled, Expr::value(enabled))
        .col_expr(pull_sync_config::Column::UpdatedAt, Expr::value(now))
        .filter(pull_sync_config::Column::SyncProjectId.eq(project_id))
        .exec(db)
        .await?;

    Ok(())
}

// ─── Pull Sync Config ────────────────────────────────────────────────────────

pub async fn find_config(
    db: &DatabaseConnection,
    project_id: Uuid,
) -> Result<Option<PullSyncConfigModel>> {
    PullSyncConfig::find()
        .filter(pull_sync_config::Column::SyncProjectId.eq(project_id))
        .one(db)
        .await
        .map_err(StoreError::from)
}

/// Return the project's config, creating one with `priority` if absent.
pub async fn ensure_config(
    db: &DatabaseConnection,
    project_id: Uuid,
    priority: Priority,
    local_repo_path: &str,
    now: DateTime<Utc>,
) -> Result<PullSyncConfigModel> {
    if let Some(existing) = find_config(db, project_id).await? {
        return Ok(existing);
    }

    let now = now.fixed_offset();
    let model = pull_sync_config::ActiveModel {
        id: Set(Uuid::new_v4()),
        sync_project_id: Set(project_id),
        priority: Set(priority),
        enabled: Set(true),
        local_repo_path: Set(local_repo_path.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    };

    PullSyncConfig::insert(model)
        .on_conflict(
            OnConflict::column(pull_sync_config::Column::SyncProjectId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    find_config(db, project_id)
        .await?
        .ok_or_else(|| StoreError::not_found_by_id("pull_sync_config", project_id))
}

// ─── Initialization ──────────────────────────────────────────────────────────

/// Make sure a project, its config and its task exist.
///
/// New configs get normal priority and a working copy at
/// `<repos_dir>/<project_key>`. The task type follows the sync method, and a
/// newly created task is due at `now`. Safe to call repeatedly.
pub async fn initialize(
    db: &DatabaseConnection,
    project_key: &str,
    sync_method: SyncMethod,
    repos_dir: &Path,
    now: DateTime<Utc>,
) -> Result<InitializedProject> {
    let (project, created) = ensure(db, project_key, sync_method, now).await?;

    let local_repo_path = repos_dir.join(&project.project_key);
    let config = ensure_config(
        db,
        project.id,
        Priority::Normal,
        &local_repo_path.to_string_lossy(),
        now,
    )
    .await?;

    let task_type = match project.sync_method {
        SyncMethod::PullSync => TaskType::Pull,
        SyncMethod::PushMirror => TaskType::Push,
    };
    let task = task::initialize(db, project.id, task_type, now).await?;

    if created {
        tracing::info!(
            project = %project.project_key,
            method = %project.sync_method,
            "Initialized sync project"
        );
    }

    Ok(InitializedProject {
        project,
        config,
        task,
        created,
    })
}
