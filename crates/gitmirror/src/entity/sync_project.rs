//! SyncProject entity - one row per mirrored source project.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How a project is replicated to the target host.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum SyncMethod {
    /// Our own executor clones from source and pushes to target.
    #[sea_orm(string_value = "pull_sync")]
    #[default]
    PullSync,
    /// The source host's native push mirror does the replication.
    #[sea_orm(string_value = "push_mirror")]
    PushMirror,
}

impl std::fmt::Display for SyncMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMethod::PullSync => write!(f, "pull_sync"),
            SyncMethod::PushMirror => write!(f, "push_mirror"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_projects")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Source `path_with_namespace`, e.g. `group/sub/project`.
    #[sea_orm(unique)]
    pub project_key: String,

    pub sync_method: SyncMethod,

    #[sea_orm(default_value = true)]
    pub enabled: bool,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sync_task::Entity")]
    SyncTasks,
    #[sea_orm(has_one = "super::pull_sync_config::Entity")]
    PullSyncConfig,
    #[sea_orm(has_many = "super::monitor_alert::Entity")]
    MonitorAlerts,
    #[sea_orm(has_many = "super::sync_event::Entity")]
    SyncEvents,
}

impl Related<super::sync_task::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SyncTasks.def()
    }
}

impl Related<super::pull_sync_config::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PullSyncConfig.def()
    }
}

impl Related<super::monitor_alert::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MonitorAlerts.def()
    }
}

impl Related<super::sync_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SyncEvents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
