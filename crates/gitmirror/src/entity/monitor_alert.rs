//! MonitorAlert entity - persisted drift alerts.
//!
//! The `dedup_key` column carries a unique index. While an alert is the live
//! dedup holder for its `(project, type)` pair the column holds
//! [`Model::dedup_key_for`]; it is set to NULL when the alert is resolved,
//! muted, or ages out of the dedup window. NULLs never collide, so the index
//! only constrains live holders.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    #[sea_orm(string_value = "sync_delay")]
    SyncDelay,
    #[sea_orm(string_value = "commit_diff")]
    CommitDiff,
    #[sea_orm(string_value = "branch_diff")]
    BranchDiff,
    #[sea_orm(string_value = "size_diff")]
    SizeDiff,
    #[sea_orm(string_value = "target_missing")]
    TargetMissing,
    #[sea_orm(string_value = "project_deleted")]
    ProjectDeleted,
}

impl AlertType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::SyncDelay => "sync_delay",
            AlertType::CommitDiff => "commit_diff",
            AlertType::BranchDiff => "branch_diff",
            AlertType::SizeDiff => "size_diff",
            AlertType::TargetMissing => "target_missing",
            AlertType::ProjectDeleted => "project_deleted",
        }
    }

    /// Human readable alert title.
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            AlertType::SyncDelay => "Sync Delay Detected",
            AlertType::CommitDiff => "Commit Difference Detected",
            AlertType::BranchDiff => "Branch Count Mismatch",
            AlertType::SizeDiff => "Repository Size Difference",
            AlertType::TargetMissing => "Target Project Missing",
            AlertType::ProjectDeleted => "Source Project Deleted",
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity, ordered from most to least severe.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[sea_orm(string_value = "critical")]
    Critical,
    #[sea_orm(string_value = "high")]
    High,
    #[sea_orm(string_value = "medium")]
    Medium,
    #[sea_orm(string_value = "low")]
    Low,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "resolved")]
    Resolved,
    #[sea_orm(string_value = "muted")]
    Muted,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Active => write!(f, "active"),
            AlertStatus::Resolved => write!(f, "resolved"),
            AlertStatus::Muted => write!(f, "muted"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "monitor_alerts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub sync_project_id: Uuid,
    pub project_key: String,

    pub alert_type: AlertType,
    pub severity: Severity,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,

    /// Structured context (project key, sync status, ...).
    #[sea_orm(column_type = "Json")]
    pub metadata: serde_json::Value,

    pub status: AlertStatus,
    #[sea_orm(unique, nullable)]
    pub dedup_key: Option<String>,

    pub triggered_at: DateTimeWithTimeZone,
    pub resolved_at: Option<DateTimeWithTimeZone>,
    /// Advisory only; nothing unmutes an alert automatically.
    pub muted_until: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// The unique dedup key for a `(project, type)` pair.
    #[must_use]
    pub fn dedup_key_for(sync_project_id: Uuid, alert_type: AlertType) -> String {
        format!("{}:{}", sync_project_id, alert_type.as_str())
    }
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
