use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use super::{AlertConfig, AlertError, RecoveryConfig, Result};
use crate::diff::ProjectDiff;
use crate::entity::monitor_alert::{
    ActiveModel, AlertStatus, AlertType, Column, Entity as MonitorAlert, Model, Severity,
};
use crate::threshold::AlertInfo;

/// Whether the condition behind an alert of `alert_type` has cleared in `diff`.
///
/// Missing measurements never count as recovered. `project_deleted` alerts
/// are only ever resolved by an operator.
pub fn has_recovered(alert_type: AlertType, diff: &ProjectDiff, recovery: &RecoveryConfig) -> bool {
    let details = &diff.details;
    match alert_type {
        AlertType::SyncDelay => details
            .sync_delay_minutes
            .is_some_and(|d| d < recovery.sync_delay_minutes),
        AlertType::CommitDiff => details
            .commit_behind
            .is_some_and(|c| c.abs() < recovery.commit_diff),
        AlertType::BranchDiff => details
            .branch_diff
            .is_some_and(|b| b.abs() <= recovery.branch_diff),
        AlertType::SizeDiff => details
            .size_diff_percent
            .is_some_and(|p| p < recovery.size_diff_percent),
        AlertType::TargetMissing => diff.target_exists(),
        AlertType::ProjectDeleted => false,
    }
}

/// Persists alerts and drives their lifecycle.
#[derive(Debug, Clone)]
pub struct AlertManager {
    db: Arc<DatabaseConnection>,
    config: AlertConfig,
}

impl AlertManager {
    pub fn new(db: Arc<DatabaseConnection>, config: AlertConfig) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    fn dedup_window(&self) -> Duration {
        Duration::minutes(self.config.dedup_window_minutes)
    }

    /// Raise an alert unless a live one exists for the same project and type.
    ///
    /// Returns `false` when the alert was deduplicated.
    pub async fn create_alert(&self, info: &AlertInfo, now: DateTime<Utc>) -> Result<bool> {
        if info.project_key.trim().is_empty() {
            return Err(AlertError::InvalidInput(
                "Missing required field: project_key".to_string(),
            ));
        }

        let dedup_key = Model::dedup_key_for(info.sync_project_id, info.alert_type);
        let cutoff = (now - self.dedup_window()).fixed_offset();

        // A holder that has aged out of the window gives up its key.
        MonitorAlert::update_many()
            .col_expr(Column::DedupKey, Expr::value(Option::<String>::None))
            .filter(Column::DedupKey.eq(dedup_key.as_str()))
            .filter(Column::TriggeredAt.lt(cutoff))
            .exec(self.db.as_ref())
            .await?;

        let model = ActiveModel {
            id: Set(Uuid::new_v4()),
            sync_project_id: Set(info.sync_project_id),
            project_key: Set(info.project_key.clone()),
            alert_type: Set(info.alert_type),
            severity: Set(info.severity),
            title: Set(info.alert_type.title().to_string()),
            description: Set(info.message.clone()),
            metadata: Set(serde_json::json!({
                "project_key": info.project_key,
                "sync_status": info.sync_status,
            })),
            status: Set(AlertStatus::Active),
            dedup_key: Set(Some(dedup_key.clone())),
            triggered_at: Set(now.fixed_offset()),
            resolved_at: Set(None),
            muted_until: Set(None),
        };

        let inserted = MonitorAlert::insert(model)
            .on_conflict(
                OnConflict::column(Column::DedupKey)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;

        if inserted == 0 {
            let holder = MonitorAlert::find()
                .filter(Column::DedupKey.eq(dedup_key.as_str()))
                .one(self.db.as_ref())
                .await?;
            tracing::debug!(
                project = %info.project_key,
                alert_type = %info.alert_type,
                holder = ?holder.map(|h| h.id),
                "Alert deduplicated"
            );
            return Ok(false);
        }

        tracing::info!(
            project = %info.project_key,
            alert_type = %info.alert_type,
            severity = %info.severity,
            "Created alert"
        );
        Ok(true)
    }

    /// Create every candidate alert, returning how many were new.
    pub async fn create_alerts(&self, alerts: &[AlertInfo], now: DateTime<Utc>) -> Result<usize> {
        let mut created = 0;
        for info in alerts {
            if self.create_alert(info, now).await? {
                created += 1;
            }
        }
        Ok(created)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>> {
        Ok(MonitorAlert::find_by_id(id).one(self.db.as_ref()).await?)
    }

    async fn get(&self, id: Uuid) -> Result<Model> {
        self.find_by_id(id).await?.ok_or(AlertError::NotFound(id))
    }

    /// Mark an alert resolved. Resolving an already resolved alert is a no-op.
    pub async fn resolve_alert(&self, id: Uuid, now: DateTime<Utc>) -> Result<Model> {
        let alert = self.get(id).await?;
        if alert.status == AlertStatus::Resolved {
            tracing::debug!(%id, "Alert already resolved");
            return Ok(alert);
        }

        let mut active = alert.into_active_model();
        active.status = Set(AlertStatus::Resolved);
        active.resolved_at = Set(Some(now.fixed_offset()));
        active.dedup_key = Set(None);
        let resolved = active.update(self.db.as_ref()).await?;

        tracing::info!(
            %id,
            project = %resolved.project_key,
            alert_type = %resolved.alert_type,
            "Resolved alert"
        );
        Ok(resolved)
    }

    /// Resolve active alerts whose project has recovered in `diffs`.
    ///
    /// Alerts for projects absent from `diffs` are left alone.
    pub async fn auto_resolve_alerts(
        &self,
        diffs: &[ProjectDiff],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let by_project: HashMap<Uuid, &ProjectDiff> =
            diffs.iter().map(|d| (d.sync_project_id, d)).collect();

        let mut resolved = 0;
        for alert in self.list_active(None).await? {
            let Some(diff) = by_project.get(&alert.sync_project_id) else {
                continue;
            };
            if has_recovered(alert.alert_type, diff, &self.config.recovery) {
                self.resolve_alert(alert.id, now).await?;
                resolved += 1;
            }
        }

        if resolved > 0 {
            tracing::info!(resolved, "Auto-resolved alerts");
        }
        Ok(resolved)
    }

    /// Mute an alert. `muted_until` is recorded but nothing unmutes the alert.
    ///
    /// A resolved alert stays resolved.
    pub async fn mute_alert(&self, id: Uuid, minutes: i64, now: DateTime<Utc>) -> Result<Model> {
        if minutes <= 0 {
            return Err(AlertError::InvalidInput(format!(
                "Mute duration must be positive, got {minutes} minutes"
            )));
        }

        let alert = self.get(id).await?;
        if alert.status == AlertStatus::Resolved {
            tracing::debug!(%id, "Alert already resolved, not muting");
            return Ok(alert);
        }

        let mut active = alert.into_active_model();
        active.status = Set(AlertStatus::Muted);
        active.muted_until = Set(Some((now + Duration::minutes(minutes)).fixed_offset()));
        active.dedup_key = Set(None);
        let muted = active.update(self.db.as_ref()).await?;

        tracing::info!(%id, minutes, "Muted alert");
        Ok(muted)
    }

    /// Active alerts, newest first, optionally for one project.
    pub async fn list_active(&self, sync_project_id: Option<Uuid>) -> Result<Vec<Model>> {
        let mut query = MonitorAlert::find().filter(Column::Status.eq(AlertStatus::Active));
        if let Some(project_id) = sync_project_id {
            query = query.filter(Column::SyncProjectId.eq(project_id));
        }
        Ok(query
            .order_by_desc(Column::TriggeredAt)
            .all(self.db.as_ref())
            .await?)
    }

    /// Alerts of any status, newest first.
    pub async fn list(&self, status: Option<AlertStatus>, limit: u64) -> Result<Vec<Model>> {
        let mut query = MonitorAlert::find();
        if let Some(status) = status {
            query = query.filter(Column::Status.eq(status));
        }
        Ok(query
            .order_by_desc(Column::TriggeredAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?)
    }

    /// Active alert counts per severity. Every severity is present.
    pub async fn count_active_by_severity(&self) -> Result<BTreeMap<Severity, u64>> {
        let rows = MonitorAlert::find()
            .filter(Column::Status.eq(AlertStatus::Active))
            .select_only()
            .column(Column::Severity)
            .column_as(Column::Id.count(), "count")
            .group_by(Column::Severity)
            .into_tuple::<(Severity, i64)>()
            .all(self.db.as_ref())
            .await?;

        let mut counts: BTreeMap<Severity, u64> = [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
        ]
        .into_iter()
        .map(|s| (s, 0))
        .collect();
        for (severity, count) in rows {
            counts.insert(severity, u64::try_from(count).unwrap_or(0));
        }
        Ok(counts)
    }

    /// Delete alerts resolved before the retention period.
    pub async fn purge_resolved(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = (now - Duration::days(self.config.retention_days)).fixed_offset();
        let result = MonitorAlert::delete_many()
            .filter(Column::Status.eq(AlertStatus::Resolved))
            .filter(Column::ResolvedAt.lt(cutoff))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected > 0 {
            tracing::info!(
                deleted = result.rows_affected,
                retention_days = self.config.retention_days,
                "Purged resolved alerts"
            );
        }
        Ok(result.rows_affected)
    }
}
