//! End-to-end test of the two paths sharing one database.
//!
//! A scan discovers a source project with no mirror, the scheduler runs its
//! push-mirror task against in-memory hosts, and the next scan sees the
//! mirror caught up and resolves the alert.

#![cfg(all(feature = "sqlite", feature = "migrate"))]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use gitmirror::alert::{AlertConfig, AlertManager};
use gitmirror::batch::{BatchConfig, BatchQueryExecutor};
use gitmirror::cache::LocalCache;
use gitmirror::connect_and_migrate;
use gitmirror::entity::monitor_alert::{AlertStatus, AlertType};
use gitmirror::entity::sync_project::SyncMethod;
use gitmirror::entity::sync_task::{LastSyncStatus, TaskType};
use gitmirror::executor::{PushMirrorExecutor, strip_credentials};
use gitmirror::gitlab::{
    BranchCommit, GitLabBranch, GitLabProject, InMemoryGitLab, ProjectStatistics,
};
use gitmirror::metrics::InMemorySink;
use gitmirror::scan::{ScanConfig, ScanService, ScanStatus, ScanType};
use gitmirror::scheduler::{Executors, Scheduler, SchedulerConfig};
use gitmirror::store::{project, task};
use gitmirror::threshold::ThresholdEvaluator;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

fn source_project() -> GitLabProject {
    GitLabProject {
        id: 1,
        name: "api".to_string(),
        path: "api".to_string(),
        path_with_namespace: "platform/api".to_string(),
        default_branch: Some("main".to_string()),
        last_activity_at: Some(base()),
        http_url_to_repo: None,
        namespace: None,
        statistics: Some(ProjectStatistics {
            commit_count: Some(240),
            repository_size: Some(4_000_000),
        }),
        archived: false,
        empty_repo: false,
    }
}

fn main_branch(sha: &str) -> Vec<GitLabBranch> {
    vec![GitLabBranch {
        name: "main".to_string(),
        default: true,
        commit: Some(BranchCommit {
            id: sha.to_string(),
            committed_date: None,
        }),
    }]
}

#[tokio::test]
async fn test_scan_sync_rescan_resolves_missing_target() {
    let db = Arc::new(
        connect_and_migrate("sqlite::memory:")
            .await
            .expect("Failed to create test database"),
    );
    let source = Arc::new(InMemoryGitLab::new("https://source.example.com"));
    let target = Arc::new(InMemoryGitLab::new("https://target.example.com"));
    let sink = Arc::new(InMemorySink::new());

    source.insert_project(source_project());
    source.set_branches(1, main_branch("9f2c1e0"));

    let scans = ScanService::new(
        db.clone(),
        BatchQueryExecutor::new(source.clone(), BatchConfig::default()).with_label("source"),
        BatchQueryExecutor::new(target.clone(), BatchConfig::default()).with_label("target"),
        ThresholdEvaluator::default(),
        AlertManager::new(db.clone(), AlertConfig::default()),
        Arc::new(LocalCache::new()),
        sink.clone(),
        ScanConfig::default(),
    );

    // Discovery: the project is new and has no mirror yet.
    let first = scans.scan_at(ScanType::Full, base()).await;
    assert_eq!(first.status, ScanStatus::Success);
    assert_eq!(first.new_projects, 1);
    assert_eq!(first.alerts_created, 1);
    let active = scans.alerts().list_active(None).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].alert_type, AlertType::TargetMissing);

    let tracked = project::get_by_key(&db, "platform/api").await.unwrap();
    assert_eq!(tracked.sync_method, SyncMethod::PushMirror);
    let tasks = task::find_all_for_project(&db, tracked.id).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task_type, TaskType::Push);

    // Sync: the push mirror executor creates the target and wires the mirror.
    let executor = PushMirrorExecutor::new(
        source.clone(),
        target.clone(),
        Some("glpat-target".to_string()),
    );
    let scheduler = Scheduler::new(
        db.clone(),
        SchedulerConfig::default(),
        Executors {
            pull: None,
            push: Some(Arc::new(executor)),
        },
        sink.clone(),
    );
    let report = scheduler.tick(Utc::now()).await.unwrap();
    assert_eq!(report.started, 1);
    for handle in report.handles {
        handle.await.unwrap();
    }

    let synced = task::find_by_id(&db, tasks[0].id).await.unwrap().unwrap();
    assert_eq!(synced.last_sync_status, Some(LastSyncStatus::Success));
    assert_eq!(synced.last_commit_sha.as_deref(), Some("9f2c1e0"));

    let mirrors = source.mirrors(1);
    assert_eq!(mirrors.len(), 1);
    assert_eq!(
        strip_credentials(&mirrors[0].url),
        "https://target.example.com/platform/api.git"
    );
    assert_eq!(source.mirror_syncs(), vec![(1, Some(mirrors[0].id))]);

    // The host's mirror copies the repository over.
    let created = target
        .find_project("platform/api")
        .expect("target project created");
    target.insert_project(GitLabProject {
        default_branch: Some("main".to_string()),
        last_activity_at: Some(base() + Duration::minutes(2)),
        statistics: source_project().statistics,
        ..created.clone()
    });
    target.set_branches(created.id, main_branch("9f2c1e0"));

    // Recheck: the mirror caught up and the alert clears.
    let second = scans
        .scan_at(ScanType::Full, base() + Duration::minutes(10))
        .await;
    assert_eq!(second.status, ScanStatus::Success);
    assert_eq!(second.new_projects, 0);
    assert_eq!(second.changes_detected, 0);
    assert_eq!(second.alerts_created, 0);
    assert_eq!(second.alerts_resolved, 1);

    assert!(scans.alerts().list_active(None).await.unwrap().is_empty());
    let resolved = scans
        .alerts()
        .list(Some(AlertStatus::Resolved), 10)
        .await
        .unwrap();
    assert_eq!(resolved.len(), 1);
    assert!(resolved[0].resolved_at.is_some());
}
