use std::sync::Arc;
use std::time::Duration;

use console::style;
use gitmirror::alert::AlertManager;
use gitmirror::batch::BatchQueryExecutor;
use gitmirror::cache::LocalCache;
use gitmirror::diff::ProjectDiff;
use gitmirror::entity::monitor_alert::Severity;
use gitmirror::executor::PushMirrorExecutor;
use gitmirror::gitlab::{GitLabClient, GitLabHostConfig, RepositoryClient};
use gitmirror::metrics::MetricsSink;
use gitmirror::scan::ScanService;
use gitmirror::scheduler::Executors;
use gitmirror::threshold::ThresholdEvaluator;
use sea_orm::DatabaseConnection;

use crate::config::Config;

pub(crate) type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Connect and bring the schema up to date.
pub(crate) async fn open_db(database_url: &str) -> CliResult<Arc<DatabaseConnection>> {
    let db = gitmirror::connect_and_migrate(database_url).await?;
    Ok(Arc::new(db))
}

pub(crate) fn gitlab_client(host: &GitLabHostConfig) -> CliResult<Arc<dyn RepositoryClient>> {
    let client = GitLabClient::from_config(host)?;
    Ok(Arc::new(client))
}

/// Push tasks run through the source host's push mirrors. Pull tasks have no
/// executor in this binary and fail as not configured.
pub(crate) fn build_executors(config: &Config) -> CliResult<Executors> {
    let source = gitlab_client(&config.source)?;
    let target = gitlab_client(&config.target)?;
    let push = PushMirrorExecutor::new(source, target, config.target.token.clone());
    Ok(Executors {
        pull: None,
        push: Some(Arc::new(push)),
    })
}

/// Build the scan service and hand back its diff cache for the cleanup sweep.
pub(crate) fn build_scan_service(
    config: &Config,
    db: Arc<DatabaseConnection>,
    metrics: Arc<dyn MetricsSink>,
) -> CliResult<(ScanService, Arc<LocalCache<ProjectDiff>>)> {
    let source = BatchQueryExecutor::new(gitlab_client(&config.source)?, config.batch.clone())
        .with_group(config.source.group.clone())
        .with_label("source");
    let target = BatchQueryExecutor::new(gitlab_client(&config.target)?, config.batch.clone())
        .with_group(config.target.group.clone())
        .with_label("target");

    let diffs = Arc::new(LocalCache::new());
    let service = ScanService::new(
        Arc::clone(&db),
        source,
        target,
        ThresholdEvaluator::new(config.monitor.thresholds.clone()),
        AlertManager::new(db, config.monitor.alerts.clone()),
        Arc::clone(&diffs),
        metrics,
        config.monitor.scan.clone(),
    );
    Ok((service, diffs))
}

pub(crate) fn cleanup_interval(config: &Config) -> Duration {
    Duration::from_secs(config.cache.cleanup_interval_secs.max(1))
}

pub(crate) fn styled_severity(severity: Severity) -> console::StyledObject<&'static str> {
    let label = severity.as_str();
    match severity {
        Severity::Critical => style(label).red().bold(),
        Severity::High => style(label).red(),
        Severity::Medium => style(label).yellow(),
        Severity::Low => style(label).dim(),
    }
}
