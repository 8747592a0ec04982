use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Timelike, Utc};
use sea_orm::DatabaseConnection;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::budget::{BudgetPermit, SyncBudget, available_slots};
use super::{Result, SchedulerConfig, transition};
use crate::entity::pull_sync_config::Model as PullSyncConfigModel;
use crate::entity::sync_task::{Model, TaskType};
use crate::executor::{ExecutorError, SyncExecutor, SyncOutcome, SyncRequest};
use crate::metrics::{self, MetricsSink};
use crate::store::{StoreError, project, task};

/// Executors by task type. A missing executor fails tasks of that type.
#[derive(Clone, Default)]
pub struct Executors {
    pub pull: Option<Arc<dyn SyncExecutor>>,
    pub push: Option<Arc<dyn SyncExecutor>>,
}

impl Executors {
    fn for_type(&self, task_type: TaskType) -> Option<Arc<dyn SyncExecutor>> {
        match task_type {
            TaskType::Pull => self.pull.clone(),
            TaskType::Push => self.push.clone(),
        }
    }
}

impl std::fmt::Debug for Executors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executors")
            .field("pull", &self.pull.is_some())
            .field("push", &self.push.is_some())
            .finish()
    }
}

/// What one tick did.
#[derive(Debug)]
pub struct DispatchReport {
    pub cap: usize,
    pub running_before: usize,
    pub picked: usize,
    pub started: usize,
    /// Tasks another dispatcher claimed first.
    pub lost_claims: usize,
    /// Spawned executions, in start order.
    pub handles: Vec<JoinHandle<()>>,
}

#[derive(Debug, Error)]
enum RunError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("Task panic: {0}")]
    Panic(String),
}

/// Claims due tasks and runs them under the shared budget.
#[derive(Clone)]
pub struct Scheduler {
    db: Arc<DatabaseConnection>,
    config: SchedulerConfig,
    budget: SyncBudget,
    executors: Executors,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("budget", &self.budget)
            .field("executors", &self.executors)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: SchedulerConfig,
        executors: Executors,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let budget = SyncBudget::new(config.concurrency.cap_at(Local::now().hour()));
        Self {
            db,
            config,
            budget,
            executors,
            metrics,
        }
    }

    /// Share an existing budget instead of creating one.
    #[must_use]
    pub fn with_budget(mut self, budget: SyncBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn budget(&self) -> &SyncBudget {
        &self.budget
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run one dispatch cycle at `now`.
    ///
    /// Never waits for a permit: a task whose claim succeeded but found the
    /// budget exhausted is handed back to waiting and the cycle ends.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<DispatchReport> {
        let cap = self
            .config
            .concurrency
            .cap_at(now.with_timezone(&Local).hour());
        self.budget.set_capacity(cap);

        let running_before = task::count_running(&self.db).await? as usize;
        let slots = available_slots(cap, running_before).min(self.budget.available());
        metrics::record_budget(self.metrics.as_ref(), cap, running_before);

        let due = task::find_due(&self.db, now, slots as u64).await?;
        let mut report = DispatchReport {
            cap,
            running_before,
            picked: due.len(),
            started: 0,
            lost_claims: 0,
            handles: Vec::with_capacity(due.len()),
        };

        for candidate in due {
            if !task::claim(&self.db, candidate.id, now).await? {
                tracing::debug!(task_id = %candidate.id, "Task claimed elsewhere, skipping");
                report.lost_claims += 1;
                continue;
            }

            let Some(permit) = self.budget.try_acquire() else {
                tracing::debug!(task_id = %candidate.id, "Budget exhausted, releasing claim");
                task::release(&self.db, candidate.id).await?;
                break;
            };

            let running = transition::start(&candidate, now);
            report
                .handles
                .push(tokio::spawn(self.clone().execute(running, permit)));
            report.started += 1;
        }

        if report.started > 0 {
            tracing::info!(
                cap,
                running = running_before,
                started = report.started,
                "Dispatched sync tasks"
            );
        }
        Ok(report)
    }

    /// Tick every `tick_interval_secs` until `shutdown` flips to true.
    ///
    /// Running executions are not cancelled on shutdown.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = Duration::from_secs(self.config.tick_interval_secs.max(1));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            tracing::info!(interval_secs = period.as_secs(), "Scheduler started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.tick(Utc::now()).await {
                            tracing::warn!(error = %e, "Dispatch cycle failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("Scheduler stopped");
        })
    }

    async fn execute(self, task: Model, permit: BudgetPermit) {
        let clock = Instant::now();

        let config = match project::find_config(&self.db, task.sync_project_id).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, "Could not load pull config");
                None
            }
        };

        let result = self.perform(&task, config.as_ref()).await;
        let now = Utc::now();
        let (next, success) = match result {
            Ok(outcome) if outcome.success => {
                let cadence = self
                    .config
                    .cadence
                    .interval_for(config.as_ref().map(|c| c.priority));
                (
                    transition::on_success(&task, now, cadence, outcome.final_sha),
                    true,
                )
            }
            Ok(outcome) => {
                let message = outcome
                    .error
                    .unwrap_or_else(|| "Sync reported failure without a message".to_string());
                (transition::on_failure(&task, now, &message), false)
            }
            Err(e) => (transition::on_failure(&task, now, &e.to_string()), false),
        };

        if success {
            tracing::info!(
                task_id = %task.id,
                task_type = %task.task_type,
                next_run_at = %next.next_run_at,
                "Sync succeeded"
            );
        } else {
            tracing::warn!(
                task_id = %task.id,
                task_type = %task.task_type,
                failures = next.consecutive_failures,
                error_type = next.error_type.as_deref().unwrap_or("unknown"),
                error = next.error_message.as_deref().unwrap_or_default(),
                next_run_at = %next.next_run_at,
                "Sync failed"
            );
        }

        if let Err(e) = task::complete(&self.db, &task, next).await {
            tracing::error!(task_id = %task.id, error = %e, "Failed to persist task outcome");
        }
        drop(permit);

        metrics::record_sync_run(self.metrics.as_ref(), task.task_type, success, clock.elapsed());
    }

    async fn perform(
        &self,
        task: &Model,
        config: Option<&PullSyncConfigModel>,
    ) -> std::result::Result<SyncOutcome, RunError> {
        let project = project::find_by_id(&self.db, task.sync_project_id)
            .await?
            .ok_or_else(|| StoreError::not_found_by_id("sync_project", task.sync_project_id))?;

        let executor = self
            .executors
            .for_type(task.task_type)
            .ok_or(ExecutorError::NotConfigured(task.task_type))?;

        let request = SyncRequest {
            task_id: task.id,
            sync_project_id: project.id,
            project_key: project.project_key,
            task_type: task.task_type,
            local_repo_path: config.map(|c| c.local_repo_path.clone()),
            force: task.force_sync,
        };
        let first = task.last_run_at.is_none();

        let handle = tokio::spawn(async move {
            if first {
                executor.sync_first(&request).await
            } else {
                executor.sync_incremental(&request).await
            }
        });

        match handle.await {
            Ok(outcome) => Ok(outcome?),
            Err(e) => Err(RunError::Panic(e.to_string())),
        }
    }
}
