use chrono::Utc;
use console::style;
use gitmirror::entity::sync_task::{LastSyncStatus, Model as TaskModel};
use gitmirror::scheduler::{reset_project, retry_project};
use gitmirror::store::task;

use super::shared::{self, CliResult};
use crate::TaskAction;

pub(crate) async fn handle_task(action: TaskAction, database_url: &str) -> CliResult<()> {
    let db = shared::open_db(database_url).await?;

    match action {
        TaskAction::List => {
            let rows = task::list_with_projects(&db).await?;
            if rows.is_empty() {
                println!("No sync tasks.");
                return Ok(());
            }
            println!(
                "{:<40} {:<5} {:<8} {:<8} {:>5}  {}",
                "PROJECT", "TYPE", "STATUS", "LAST", "FAILS", "NEXT RUN"
            );
            for (task, project) in rows {
                let key = project
                    .map(|p| p.project_key)
                    .unwrap_or_else(|| task.sync_project_id.to_string());
                println!(
                    "{:<40} {:<5} {:<8} {:<8} {:>5}  {}",
                    key,
                    task.task_type,
                    task.status,
                    last_status(&task),
                    task.consecutive_failures,
                    task.next_run_at.format("%Y-%m-%d %H:%M:%S %z"),
                );
            }
        }
        TaskAction::Retry { project } => {
            let tasks = retry_project(&db, &project, Utc::now()).await?;
            println!(
                "{} Scheduled {} task(s) of {} to run now",
                style("✓").green(),
                tasks.len(),
                style(&project).bold()
            );
        }
        TaskAction::Reset { project } => {
            let tasks = reset_project(&db, &project, Utc::now()).await?;
            println!(
                "{} Cleared failures on {} task(s) of {}",
                style("✓").green(),
                tasks.len(),
                style(&project).bold()
            );
        }
    }

    Ok(())
}

fn last_status(task: &TaskModel) -> &'static str {
    match task.last_sync_status {
        Some(LastSyncStatus::Success) => "success",
        Some(LastSyncStatus::Failed) => "failed",
        None => "-",
    }
}
