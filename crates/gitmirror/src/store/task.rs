use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait, UpdateMany,
};
use uuid::Uuid;

use crate::entity::sync_project::{self, Entity as SyncProject, Model as SyncProjectModel};
use crate::entity::sync_task::{
    ActiveModel, Column, Entity as SyncTask, Model, TaskStatus, TaskType,
};
use crate::scheduler::transition;

use super::errors::{Result, StoreError};

pub async fn find_by_id(db: &DatabaseConnection, id: Uuid) -> Result<Option<Model>> {
    SyncTask::find_by_id(id)
        .one(db)
        .await
        .map_err(StoreError::from)
}

/// Find the task of `task_type` for a project.
pub async fn find_by_project(
    db: &DatabaseConnection,
    project_id: Uuid,
    task_type: TaskType,
) -> Result<Option<Model>> {
    SyncTask::find()
        .filter(Column::SyncProjectId.eq(project_id))
        .filter(Column::TaskType.eq(task_type))
        .one(db)
        .await
        .map_err(StoreError::from)
}

/// All tasks of a project, pull before push.
pub async fn find_all_for_project(db: &DatabaseConnection, project_id: Uuid) -> Result<Vec<Model>> {
    SyncTask::find()
        .filter(Column::SyncProjectId.eq(project_id))
        .order_by_asc(Column::TaskType)
        .all(db)
        .await
        .map_err(StoreError::from)
}

/// Every task joined with its project, soonest first.
pub async fn list_with_projects(
    db: &DatabaseConnection,
) -> Result<Vec<(Model, Option<SyncProjectModel>)>> {
    SyncTask::find()
        .find_also_related(SyncProject)
        .order_by_asc(Column::NextRunAt)
        .all(db)
        .await
        .map_err(StoreError::from)
}

/// Return the task for `(project, task_type)`, inserting a waiting task due at
/// `now` when none exists.
///
/// The unique `(sync_project_id, task_type)` index arbitrates concurrent
/// initialization; a losing insert is ignored and the winner is re-read.
pub async fn initialize(
    db: &DatabaseConnection,
    project_id: Uuid,
    task_type: TaskType,
    now: DateTime<Utc>,
) -> Result<Model> {
    if let Some(existing) = find_by_project(db, project_id, task_type).await? {
        return Ok(existing);
    }

    let now = now.fixed_offset();
    let model = ActiveModel {
        id: Set(Uuid::new_v4()),
        sync_project_id: Set(project_id),
        task_type: Set(task_type),
        status: Set(TaskStatus::Waiting),
        next_run_at: Set(now),
        last_run_at: Set(None),
        force_sync: Set(false),
        last_sync_status: Set(None),
        consecutive_failures: Set(0),
        error_type: Set(None),
        error_message: Set(None),
        last_commit_sha: Set(None),
        started_at: Set(None),
        completed_at: Set(None),
        duration_seconds: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };

    SyncTask::insert(model)
        .on_conflict(
            OnConflict::columns([Column::SyncProjectId, Column::TaskType])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    find_by_project(db, project_id, task_type)
        .await?
        .ok_or_else(|| StoreError::not_found_by_id("sync_task", project_id))
}

/// Waiting tasks due at or before `now`, soonest first, capped at `limit`.
///
/// Tasks of disabled projects are skipped.
pub async fn find_due(db: &DatabaseConnection, now: DateTime<Utc>, limit: u64) -> Result<Vec<Model>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    SyncTask::find()
        .inner_join(SyncProject)
        .filter(Column::Status.eq(TaskStatus::Waiting))
        .filter(Column::NextRunAt.lte(now.fixed_offset()))
        .filter(sync_project::Column::Enabled.eq(true))
        .order_by_asc(Column::NextRunAt)
        .limit(limit)
        .all(db)
        .await
        .map_err(StoreError::from)
}

pub async fn count_running(db: &DatabaseConnection) -> Result<u64> {
    SyncTask::find()
        .filter(Column::Status.eq(TaskStatus::Running))
        .count(db)
        .await
        .map_err(StoreError::from)
}

/// Atomically move a task from waiting to running.
///
/// Returns false when another dispatcher claimed it first (or it is no longer
/// waiting). This conditional update is the only waiting to running edge.
pub async fn claim(db: &DatabaseConnection, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
    let result = build_claim(id, now).exec(db).await?;
    Ok(result.rows_affected == 1)
}

pub(crate) fn build_claim(id: Uuid, now: DateTime<Utc>) -> UpdateMany<SyncTask> {
    let now = now.fixed_offset();
    SyncTask::update_many()
        .col_expr(Column::Status, Expr::value(TaskStatus::Running))
        .col_expr(Column::StartedAt, Expr::value(Some(now)))
        .col_expr(Column::UpdatedAt, Expr::value(now))
        .filter(Column::Id.eq(id))
        .filter(Column::Status.eq(TaskStatus::Waiting))
}

/// Hand a claimed task back to waiting without running it.
pub async fn release(db: &DatabaseConnection, id: Uuid) -> Result<bool> {
    let result = SyncTask::update_many()
        .col_expr(Column::Status, Expr::value(TaskStatus::Waiting))
        .filter(Column::Id.eq(id))
        .filter(Column::Status.eq(TaskStatus::Running))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Persist a task value produced by a scheduler transition.
///
/// Every column is written, so the stored row equals `model` afterwards.
pub async fn save(db: &DatabaseConnection, model: Model) -> Result<Model> {
    let active = ActiveModel::from(model).reset_all();
    active.update(db).await.map_err(StoreError::from)
}

/// Move `next_run_at` and leave every other column alone.
///
/// A claim that lands first keeps its `running` status.
pub async fn reschedule(db: &DatabaseConnection, id: Uuid, at: DateTime<Utc>) -> Result<Model> {
    build_reschedule(id, at).exec(db).await?;
    find_by_id(db, id)
        .await?
        .ok_or_else(|| StoreError::not_found_by_id("sync_task", id))
}

pub(crate) fn build_reschedule(id: Uuid, at: DateTime<Utc>) -> UpdateMany<SyncTask> {
    let at = at.fixed_offset();
    SyncTask::update_many()
        .col_expr(Column::NextRunAt, Expr::value(at))
        .col_expr(Column::UpdatedAt, Expr::value(at))
        .filter(Column::Id.eq(id))
}

/// Persist the outcome of a run dispatched as `claimed`.
///
/// The row is re-read under a lock so a reschedule made while the run was in
/// flight is merged in rather than overwritten.
pub async fn complete(db: &DatabaseConnection, claimed: &Model, next: Model) -> Result<Model> {
    let txn = db.begin().await?;
    let stored = SyncTask::find_by_id(next.id)
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or_else(|| StoreError::not_found_by_id("sync_task", next.id))?;

    let merged = transition::merge_completion(&stored, claimed, next);
    let saved = ActiveModel::from(merged).reset_all().update(&txn).await?;
    txn.commit().await?;
    Ok(saved)
}
