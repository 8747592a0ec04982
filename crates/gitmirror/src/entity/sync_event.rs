//! SyncEvent entity - append-only audit trail for webhook and operator actions.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    #[sea_orm(string_value = "webhook_push")]
    WebhookPush,
    #[sea_orm(string_value = "manual_retry")]
    ManualRetry,
    #[sea_orm(string_value = "reset_failures")]
    ResetFailures,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    #[sea_orm(string_value = "webhook")]
    Webhook,
    #[sea_orm(string_value = "scheduler")]
    Scheduler,
    #[sea_orm(string_value = "operator")]
    Operator,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub sync_project_id: Uuid,
    pub event_type: EventType,
    pub event_source: EventSource,
    /// Free-form outcome, e.g. `accepted`, `debounced`, `initialized`.
    pub status: String,

    pub git_ref: Option<String>,
    pub commit_sha: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub message: Option<String>,

    #[sea_orm(column_type = "Json")]
    pub event_data: serde_json::Value,

    pub event_time: DateTimeWithTimeZone,
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
