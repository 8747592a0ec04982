//! Scan orchestration: list both hosts, diff every mirrored project, raise
//! and resolve alerts, export the results.
//!
//! # Module Structure
//!
//! - [`types`] - scan types, configuration and snapshot building

pub mod types;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::alert::{AlertError, AlertManager};
use crate::batch::{BatchError, BatchQueryExecutor, EnrichedProject};
use crate::cache::LocalCache;
use crate::diff::{ProjectDiff, SyncStatus};
use crate::entity::monitor_alert::{AlertType, Severity};
use crate::metrics::{self, MetricsSink};
use crate::store::{StoreError, project};
use crate::threshold::{AlertInfo, ThresholdEvaluator};

pub use types::{
    DEFAULT_LOOKBACK_MINUTES, DIFF_KEY_PREFIX, LAST_SCAN_KEY, ScanConfig, ScanResult, ScanStatus,
    ScanType, snapshot,
};
use types::ScanCounts;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Alert(#[from] AlertError),
}

pub type Result<T> = std::result::Result<T, ScanError>;

/// Runs scans against one source and one target host.
#[derive(Clone)]
pub struct ScanService {
    db: Arc<DatabaseConnection>,
    source: BatchQueryExecutor,
    target: BatchQueryExecutor,
    evaluator: ThresholdEvaluator,
    alerts: AlertManager,
    diffs: Arc<LocalCache<ProjectDiff>>,
    markers: Arc<LocalCache<DateTime<Utc>>>,
    metrics: Arc<dyn MetricsSink>,
    config: ScanConfig,
}

impl std::fmt::Debug for ScanService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanService")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ScanService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        source: BatchQueryExecutor,
        target: BatchQueryExecutor,
        evaluator: ThresholdEvaluator,
        alerts: AlertManager,
        diffs: Arc<LocalCache<ProjectDiff>>,
        metrics: Arc<dyn MetricsSink>,
        config: ScanConfig,
    ) -> Self {
        Self {
            db,
            source,
            target,
            evaluator,
            alerts,
            diffs,
            markers: Arc::new(LocalCache::new()),
            metrics,
            config,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.alerts
    }

    /// The most recent diff of `project_key`, if still cached.
    pub async fn cached_diff(&self, project_key: &str) -> Option<ProjectDiff> {
        self.diffs.get(&format!("{DIFF_KEY_PREFIX}{project_key}")).await
    }

    pub async fn last_scan_time(&self) -> Option<DateTime<Utc>> {
        self.markers.get(LAST_SCAN_KEY).await
    }

    pub async fn scan(&self, scan_type: ScanType) -> ScanResult {
        self.scan_at(scan_type, Utc::now()).await
    }

    /// Run one scan stamped with `now`. Never fails: an error ends the
    /// cycle and is reported in the result.
    pub async fn scan_at(&self, scan_type: ScanType, now: DateTime<Utc>) -> ScanResult {
        let clock = Instant::now();
        tracing::info!(%scan_type, "Starting scan");

        let outcome = self.run(scan_type, now).await;
        let elapsed = clock.elapsed();
        let finished_at = now + chrono::Duration::from_std(elapsed).unwrap_or_default();

        let (status, error_message, counts) = match outcome {
            Ok(counts) => (ScanStatus::Success, None, counts),
            Err(e) => {
                tracing::error!(%scan_type, error = %e, "Scan failed");
                (ScanStatus::Failed, Some(e.to_string()), ScanCounts::default())
            }
        };

        self.metrics.histogram(
            metrics::SCAN_DURATION_SECONDS,
            &[("scan_type", scan_type.to_string())],
            elapsed.as_secs_f64(),
        );
        self.metrics.counter(
            metrics::SCAN_RUNS_TOTAL,
            &[
                ("scan_type", scan_type.to_string()),
                ("status", status.as_str().to_string()),
            ],
            1,
        );

        let result = ScanResult {
            scan_type,
            status,
            error_message,
            started_at: now,
            finished_at,
            duration_ms: elapsed.as_millis() as u64,
            projects_scanned: counts.projects_scanned,
            new_projects: counts.new_projects,
            changes_detected: counts.changes_detected,
            alerts_created: counts.alerts_created,
            alerts_resolved: counts.alerts_resolved,
            deleted_projects: counts.deleted_projects,
        };

        if status == ScanStatus::Success {
            tracing::info!(
                %scan_type,
                duration_ms = result.duration_ms,
                scanned = result.projects_scanned,
                new = result.new_projects,
                changes = result.changes_detected,
                alerts_created = result.alerts_created,
                alerts_resolved = result.alerts_resolved,
                "Scan complete"
            );
        }
        result
    }

    async fn run(&self, scan_type: ScanType, now: DateTime<Utc>) -> Result<ScanCounts> {
        let updated_after = match scan_type {
            ScanType::Full => None,
            ScanType::Incremental => Some(
                self.last_scan_time()
                    .await
                    .unwrap_or_else(|| now - chrono::Duration::minutes(DEFAULT_LOOKBACK_MINUTES)),
            ),
        };

        let (source_listing, target_listing) = tokio::try_join!(
            self.source.list_projects(updated_after),
            self.target.list_projects(updated_after),
        )?;
        tracing::debug!(
            source = source_listing.projects.len(),
            target = target_listing.projects.len(),
            ?updated_after,
            "Listed projects"
        );

        let source_complete = source_listing.complete;
        let (sources, targets) = tokio::join!(
            self.source.fetch_details(source_listing.projects),
            self.target.fetch_details(target_listing.projects),
        );

        let mut by_path: HashMap<String, EnrichedProject> = targets
            .into_iter()
            .map(|t| (t.project.path_with_namespace.clone(), t))
            .collect();
        if scan_type == ScanType::Incremental {
            self.lookup_missing_targets(&sources, &mut by_path).await?;
        }

        let mut counts = ScanCounts {
            projects_scanned: sources.len(),
            ..ScanCounts::default()
        };
        let mut diffs = Vec::with_capacity(sources.len());

        for source in &sources {
            let key = source.project.path_with_namespace.as_str();
            let sync_project_id = match project::find_by_key(&self.db, key).await? {
                Some(existing) => existing.id,
                None => {
                    let initialized = project::initialize(
                        &self.db,
                        key,
                        self.config.default_sync_method,
                        &self.config.repos_dir,
                        now,
                    )
                    .await?;
                    counts.new_projects += 1;
                    initialized.project.id
                }
            };

            let diff = ProjectDiff::compute(
                key,
                sync_project_id,
                Some(snapshot(source)),
                by_path.get(key).map(snapshot),
                now,
            );
            self.diffs
                .put(
                    format!("{DIFF_KEY_PREFIX}{key}"),
                    diff.clone(),
                    self.config.diff_ttl(),
                )
                .await;
            diffs.push(diff);
        }
        counts.changes_detected = diffs
            .iter()
            .filter(|d| d.status != SyncStatus::Synced)
            .count();

        let candidates = self.evaluator.evaluate_all(&diffs);
        counts.alerts_created = self.alerts.create_alerts(&candidates, now).await?;
        counts.alerts_resolved = self.alerts.auto_resolve_alerts(&diffs, now).await?;

        if scan_type == ScanType::Full {
            if source_complete {
                let seen: HashSet<&str> = sources
                    .iter()
                    .map(|s| s.project.path_with_namespace.as_str())
                    .collect();
                let (deleted, created) = self.flag_deleted_projects(&seen, now).await?;
                counts.deleted_projects = deleted;
                counts.alerts_created += created;
            } else {
                tracing::warn!("Source listing incomplete, skipping deleted-project check");
            }
        }

        self.export(&diffs).await?;
        self.markers
            .put(LAST_SCAN_KEY, now, self.config.last_scan_ttl())
            .await;

        Ok(counts)
    }

    /// Incremental listings only include recently active targets; look up
    /// the rest by path so an idle mirror is not mistaken for a missing one.
    async fn lookup_missing_targets(
        &self,
        sources: &[EnrichedProject],
        by_path: &mut HashMap<String, EnrichedProject>,
    ) -> Result<()> {
        let mut found = Vec::new();
        for source in sources {
            let key = &source.project.path_with_namespace;
            if by_path.contains_key(key) {
                continue;
            }
            if let Some(target) = self.target.lookup_project(key).await? {
                found.push(target);
            }
        }
        if found.is_empty() {
            return Ok(());
        }

        tracing::debug!(found = found.len(), "Looked up idle target projects");
        for target in self.target.fetch_details(found).await {
            by_path.insert(target.project.path_with_namespace.clone(), target);
        }
        Ok(())
    }

    /// Raise `project_deleted` for tracked projects missing from the source.
    async fn flag_deleted_projects(
        &self,
        seen: &HashSet<&str>,
        now: DateTime<Utc>,
    ) -> Result<(usize, usize)> {
        let scope = self.source.group().map(|g| format!("{}/", g.trim_matches('/')));
        let missing: Vec<AlertInfo> = project::list(&self.db)
            .await?
            .into_iter()
            .filter(|p| p.enabled)
            .filter(|p| {
                scope
                    .as_deref()
                    .is_none_or(|prefix| p.project_key.starts_with(prefix))
            })
            .filter(|p| !seen.contains(p.project_key.as_str()))
            .map(|p| AlertInfo {
                sync_project_id: p.id,
                message: format!("Project {} no longer exists in source GitLab", p.project_key),
                project_key: p.project_key,
                alert_type: AlertType::ProjectDeleted,
                severity: Severity::Medium,
                sync_status: SyncStatus::Failed,
            })
            .collect();

        for info in &missing {
            tracing::warn!(project = %info.project_key, "Tracked project missing from source");
        }
        let created = self.alerts.create_alerts(&missing, now).await?;
        Ok((missing.len(), created))
    }

    async fn export(&self, diffs: &[ProjectDiff]) -> Result<()> {
        let sink = self.metrics.as_ref();
        sink.gauge(metrics::PROJECTS_SCANNED, &[], diffs.len() as f64);
        for status in SyncStatus::ALL {
            let count = diffs.iter().filter(|d| d.status == status).count();
            sink.gauge(
                metrics::PROJECTS_BY_STATUS,
                &[("status", status.to_string())],
                count as f64,
            );
        }

        let active = self.alerts.count_active_by_severity().await?;
        metrics::record_alert_counts(sink, &active);
        metrics::record_cache(sink, &self.diffs.stats().await);
        Ok(())
    }
}

/// Scan every `interval_secs`; every `full_scan_every`th cycle is full.
///
/// The first cycle runs immediately and is incremental.
pub fn spawn_periodic_scan(service: ScanService, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(service.config().interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let full_every = service.config().full_scan_every.max(1);
        let mut cycle: u32 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    cycle = cycle.wrapping_add(1);
                    let scan_type = if cycle % full_every == 0 {
                        ScanType::Full
                    } else {
                        ScanType::Incremental
                    };
                    service.scan(scan_type).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Periodic scan stopped");
    })
}
