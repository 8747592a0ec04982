//! PullSyncConfig entity - per-project settings read by the scheduler.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Scheduling priority. Drives the success cadence of a project's task.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[sea_orm(string_value = "critical")]
    Critical,
    #[sea_orm(string_value = "high")]
    High,
    #[sea_orm(string_value = "normal")]
    #[default]
    Normal,
    #[sea_orm(string_value = "low")]
    Low,
}

impl Priority {
    /// The key used in the cadence table.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pull_sync_configs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub sync_project_id: Uuid,

    pub priority: Priority,

    #[sea_orm(default_value = true)]
    pub enabled: bool,

    /// Working copy location used by the git executor.
    #[sea_orm(column_type = "Text")]
    pub local_repo_path: String,

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
