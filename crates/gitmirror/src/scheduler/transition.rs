//! Pure task state transitions.
//!
//! Each function takes the current task value and returns the next one; the
//! caller persists the result with [`crate::store::task::save`], or with
//! [`crate::store::task::complete`] at the end of a run. The only
//! edge not modelled here is waiting to running, which is a conditional
//! UPDATE at claim time ([`crate::store::task::claim`]).

use chrono::{DateTime, Duration, Utc};

use crate::entity::sync_task::{LastSyncStatus, Model, TaskStatus};

use super::cadence::failure_backoff;
use super::classify::{ErrorType, classify};

/// The in-memory counterpart of a successful claim.
pub fn start(task: &Model, now: DateTime<Utc>) -> Model {
    let now = now.fixed_offset();
    Model {
        status: TaskStatus::Running,
        started_at: Some(now),
        updated_at: now,
        ..task.clone()
    }
}

/// Record a successful run and schedule the next one `cadence` from now.
pub fn on_success(
    task: &Model,
    now: DateTime<Utc>,
    cadence: Duration,
    final_sha: Option<String>,
) -> Model {
    let fixed = now.fixed_offset();
    Model {
        status: TaskStatus::Waiting,
        last_sync_status: Some(LastSyncStatus::Success),
        consecutive_failures: 0,
        error_type: None,
        error_message: None,
        force_sync: false,
        next_run_at: (now + cadence).fixed_offset(),
        last_run_at: Some(fixed),
        completed_at: Some(fixed),
        duration_seconds: Some(elapsed_seconds(task, now)),
        last_commit_sha: final_sha.or_else(|| task.last_commit_sha.clone()),
        updated_at: fixed,
        ..task.clone()
    }
}

/// Record a failed run, classify the error and back off.
pub fn on_failure(task: &Model, now: DateTime<Utc>, message: &str) -> Model {
    let fixed = now.fixed_offset();
    let failures = task.consecutive_failures.saturating_add(1);
    let error_type: ErrorType = classify(message);
    Model {
        status: TaskStatus::Waiting,
        last_sync_status: Some(LastSyncStatus::Failed),
        consecutive_failures: failures,
        error_type: Some(error_type.as_str().to_string()),
        error_message: Some(message.to_string()),
        next_run_at: (now + failure_backoff(failures)).fixed_offset(),
        last_run_at: Some(fixed),
        completed_at: Some(fixed),
        duration_seconds: Some(elapsed_seconds(task, now)),
        updated_at: fixed,
        ..task.clone()
    }
}

/// Make a task due immediately, whatever its state. Failure history is kept.
pub fn manual_retry(task: &Model, now: DateTime<Utc>) -> Model {
    let fixed = now.fixed_offset();
    Model {
        status: TaskStatus::Waiting,
        next_run_at: fixed,
        force_sync: true,
        updated_at: fixed,
        ..task.clone()
    }
}

/// Clear failure history and return the task to waiting.
///
/// `next_run_at` is kept, so a task in backoff still waits out its delay.
pub fn reset_failures(task: &Model, now: DateTime<Utc>) -> Model {
    Model {
        status: TaskStatus::Waiting,
        consecutive_failures: 0,
        error_type: None,
        error_message: None,
        updated_at: now.fixed_offset(),
        ..task.clone()
    }
}

/// Fold a reschedule that landed during a run into that run's outcome.
///
/// `claimed` is the row as dispatched. When the stored due time has moved
/// since, the earlier of it and the outcome's due time wins, and a retry's
/// forced sync is kept for the next run.
pub fn merge_completion(stored: &Model, claimed: &Model, next: Model) -> Model {
    if stored.next_run_at == claimed.next_run_at {
        return next;
    }
    Model {
        next_run_at: next.next_run_at.min(stored.next_run_at),
        force_sync: next.force_sync || (stored.force_sync && !claimed.force_sync),
        ..next
    }
}

fn elapsed_seconds(task: &Model, now: DateTime<Utc>) -> i64 {
    task.started_at
        .map_or(0, |started| (now - started.with_timezone(&Utc)).num_seconds().max(0))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use uuid::Uuid;

    use super::*;
    use crate::entity::sync_task::TaskType;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, minute, 0)
            .single()
            .expect("valid timestamp")
    }

    fn task() -> Model {
        let created = at(0).fixed_offset();
        Model {
            id: Uuid::new_v4(),
            sync_project_id: Uuid::new_v4(),
            task_type: TaskType::Pull,
            status: TaskStatus::Waiting,
            next_run_at: created,
            last_run_at: None,
            force_sync: false,
            last_sync_status: None,
            consecutive_failures: 0,
            error_type: None,
            error_message: None,
            last_commit_sha: None,
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn start_marks_running() {
        let running = start(&task(), at(1));
        assert_eq!(running.status, TaskStatus::Running);
        assert_eq!(running.started_at, Some(at(1).fixed_offset()));
    }

    #[test]
    fn success_resets_failures_and_schedules_by_cadence() {
        let mut failed = on_failure(&start(&task(), at(1)), at(2), "timeout");
        failed.force_sync = true;
        let running = start(&failed, at(10));

        let done = on_success(&running, at(12), Duration::minutes(30), Some("abc".into()));

        assert_eq!(done.status, TaskStatus::Waiting);
        assert_eq!(done.last_sync_status, Some(LastSyncStatus::Success));
        assert_eq!(done.consecutive_failures, 0);
        assert_eq!(done.error_type, None);
        assert_eq!(done.error_message, None);
        assert!(!done.force_sync);
        assert_eq!(done.next_run_at, at(42).fixed_offset());
        assert_eq!(done.duration_seconds, Some(120));
        assert_eq!(done.last_commit_sha.as_deref(), Some("abc"));
        assert_eq!(done.last_run_at, Some(at(12).fixed_offset()));
    }

    #[test]
    fn success_without_sha_keeps_previous() {
        let mut prior = task();
        prior.last_commit_sha = Some("old".into());
        let done = on_success(&start(&prior, at(1)), at(2), Duration::minutes(10), None);
        assert_eq!(done.last_commit_sha.as_deref(), Some("old"));
    }

    #[test]
    fn failure_increments_and_backs_off() {
        let first = on_failure(&start(&task(), at(0)), at(1), "Network error: reset");
        assert_eq!(first.status, TaskStatus::Waiting);
        assert_eq!(first.last_sync_status, Some(LastSyncStatus::Failed));
        assert_eq!(first.consecutive_failures, 1);
        assert_eq!(first.error_type.as_deref(), Some("network_error"));
        assert_eq!(first.error_message.as_deref(), Some("Network error: reset"));
        assert_eq!(first.next_run_at, at(11).fixed_offset());

        let second = on_failure(&start(&first, at(11)), at(11), "disk full");
        assert_eq!(second.consecutive_failures, 2);
        assert_eq!(second.error_type.as_deref(), Some("disk_error"));
        assert_eq!(second.next_run_at, at(31).fixed_offset());
    }

    #[test]
    fn manual_retry_forces_immediate_run_and_keeps_failures() {
        let mut stuck = start(&task(), at(0));
        stuck.consecutive_failures = 4;
        stuck.next_run_at = at(59).fixed_offset();

        let retried = manual_retry(&stuck, at(5));
        assert_eq!(retried.status, TaskStatus::Waiting);
        assert_eq!(retried.next_run_at, at(5).fixed_offset());
        assert!(retried.force_sync);
        assert_eq!(retried.consecutive_failures, 4);
    }

    #[test]
    fn reset_clears_failure_state() {
        let failed = on_failure(&start(&task(), at(0)), at(1), "unauthorized");
        let reset = reset_failures(&failed, at(2));
        assert_eq!(reset.consecutive_failures, 0);
        assert_eq!(reset.error_message, None);
        assert_eq!(reset.error_type, None);
        assert_eq!(reset.status, TaskStatus::Waiting);
        assert_eq!(reset.next_run_at, failed.next_run_at);
    }

    #[test]
    fn completion_keeps_reschedule_made_during_run() {
        let claimed = start(&task(), at(0));
        let pushed = Model {
            next_run_at: at(2).fixed_offset(),
            ..claimed.clone()
        };
        let done = on_success(&claimed, at(5), Duration::minutes(120), None);

        let merged = merge_completion(&pushed, &claimed, done);
        assert_eq!(merged.next_run_at, at(2).fixed_offset());
        assert_eq!(merged.status, TaskStatus::Waiting);
        assert_eq!(merged.last_sync_status, Some(LastSyncStatus::Success));
    }

    #[test]
    fn completion_without_reschedule_uses_outcome() {
        let claimed = start(&task(), at(0));
        let done = on_failure(&claimed, at(1), "timeout");
        let merged = merge_completion(&claimed, &claimed, done.clone());
        assert_eq!(merged, done);
    }

    #[test]
    fn completion_keeps_retry_forced_during_run() {
        let claimed = start(&task(), at(0));
        let retried = manual_retry(&claimed, at(3));
        let done = on_success(&claimed, at(4), Duration::minutes(30), None);

        let merged = merge_completion(&retried, &claimed, done);
        assert!(merged.force_sync);
        assert_eq!(merged.next_run_at, at(3).fixed_offset());
    }
}
