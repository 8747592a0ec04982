//! SyncTask entity - the schedulable unit, one per project and task type.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Which replication path a task drives.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[sea_orm(string_value = "pull")]
    #[default]
    Pull,
    #[sea_orm(string_value = "push")]
    Push,
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[sea_orm(string_value = "waiting")]
    #[default]
    Waiting,
    #[sea_orm(string_value = "running")]
    Running,
}

/// Outcome of the most recent completed run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum LastSyncStatus {
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::Pull => write!(f, "pull"),
            TaskType::Push => write!(f, "push"),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Waiting => write!(f, "waiting"),
            TaskStatus::Running => write!(f, "running"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_tasks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub sync_project_id: Uuid,
    pub task_type: TaskType,
    pub status: TaskStatus,

    // ─── Scheduling ──────────────────────────────────────────────────────────
    pub next_run_at: DateTimeWithTimeZone,
    pub last_run_at: Option<DateTimeWithTimeZone>,
    /// Set by a manual retry, cleared by the next successful run.
    #[sea_orm(default_value = false)]
    pub force_sync: bool,

    // ─── Last Outcome ────────────────────────────────────────────────────────
    pub last_sync_status: Option<LastSyncStatus>,
    #[sea_orm(default_value = 0)]
    pub consecutive_failures: i32,
    /// Classified error category, see `scheduler::ErrorType`.
    pub error_type: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
    pub last_commit_sha: Option<String>,

    // ─── Timing ──────────────────────────────────────────────────────────────
    pub started_at: Option<DateTimeWithTimeZone>,
    pub completed_at: Option<DateTimeWithTimeZone>,
    pub duration_seconds: Option<i64>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sync_project::Entity",
        from = "Column::SyncProjectId",
        to = "super::sync_project::Column::Id",
        on_delete = "Cascade"
    )]
    SyncProject,
}

impl Related<super::sync_project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SyncProject.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
