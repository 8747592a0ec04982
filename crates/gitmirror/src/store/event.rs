use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde_json::Value;
use uuid::Uuid;

use crate::entity::sync_event::{
    ActiveModel, Column, Entity as SyncEvent, EventSource, EventType, Model,
};

use super::errors::{Result, StoreError};

/// An event about to be appended to the audit trail.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub sync_project_id: Uuid,
    pub event_type: EventType,
    pub event_source: EventSource,
    pub status: String,
    pub git_ref: Option<String>,
    pub commit_sha: Option<String>,
    pub message: Option<String>,
    pub event_data: Value,
}

impl NewEvent {
    pub fn new(
        sync_project_id: Uuid,
        event_type: EventType,
        event_source: EventSource,
        status: impl Into<String>,
    ) -> Self {
        Self {
            sync_project_id,
            event_type,
            event_source,
            status: status.into(),
            git_ref: None,
            commit_sha: None,
            message: None,
            event_data: Value::Object(Default::default()),
        }
    }

    #[must_use]
    pub fn git_ref(mut self, git_ref: Option<String>) -> Self {
        self.git_ref = git_ref;
        self
    }

    #[must_use]
    pub fn commit_sha(mut self, commit_sha: Option<String>) -> Self {
        self.commit_sha = commit_sha;
        self
    }

    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn data(mut self, event_data: Value) -> Self {
        self.event_data = event_data;
        self
    }
}

pub async fn record(db: &DatabaseConnection, event: NewEvent, now: DateTime<Utc>) -> Result<Model> {
    let model = ActiveModel {
        id: Set(Uuid::new_v4()),
        sync_project_id: Set(event.sync_project_id),
        event_type: Set(event.event_type),
        event_source: Set(event.event_source),
        status: Set(event.status),
        git_ref: Set(event.git_ref),
        commit_sha: Set(event.commit_sha),
        message: Set(event.message),
        event_data: Set(event.event_data),
        event_time: Set(now.fixed_offset()),
    };

    model.insert(db).await.map_err(StoreError::from)
}

/// Record an event, logging instead of failing.
pub async fn record_best_effort(db: &DatabaseConnection, event: NewEvent, now: DateTime<Utc>) {
    let project_id = event.sync_project_id;
    let event_type = event.event_type;
    if let Err(e) = record(db, event, now).await {
        tracing::warn!(
            project_id = %project_id,
            event_type = ?event_type,
            error = %e,
            "Failed to record sync event"
        );
    }
}

/// Most recent events of a project, newest first.
pub async fn list_for_project(
    db: &DatabaseConnection,
    project_id: Uuid,
    limit: u64,
) -> Result<Vec<Model>> {
    SyncEvent::find()
        .filter(Column::SyncProjectId.eq(project_id))
        .order_by_desc(Column::EventTime)
        .limit(limit)
        .all(db)
        .await
        .map_err(StoreError::from)
}
