//! Common re-exports for convenient entity usage.

pub use super::monitor_alert::{
    ActiveModel as MonitorAlertActiveModel, AlertStatus, AlertType, Column as MonitorAlertColumn,
    Entity as MonitorAlert, Model as MonitorAlertModel, Severity,
};
pub use super::pull_sync_config::{
    ActiveModel as PullSyncConfigActiveModel, Column as PullSyncConfigColumn,
    Entity as PullSyncConfig, Model as PullSyncConfigModel, Priority,
};
pub use super::sync_event::{
    ActiveModel as SyncEventActiveModel, Column as SyncEventColumn, Entity as SyncEvent,
    EventSource, EventType, Model as SyncEventModel,
};
pub use super::sync_project::{
    ActiveModel as SyncProjectActiveModel, Column as SyncProjectColumn, Entity as SyncProject,
    Model as SyncProjectModel, SyncMethod,
};
pub use super::sync_task::{
    ActiveModel as SyncTaskActiveModel, Column as SyncTaskColumn, Entity as SyncTask,
    LastSyncStatus, Model as SyncTaskModel, TaskStatus, TaskType,
};
