use console::style;
use gitmirror::db;
use gitmirror::migration::{Migrator, MigratorTrait};

use super::shared::CliResult;
use crate::MigrateAction;

pub(crate) async fn handle_migrate(action: MigrateAction, database_url: &str) -> CliResult<()> {
    let db = db::connect(database_url).await?;

    match action {
        MigrateAction::Up => {
            let pending = Migrator::get_pending_migrations(&db).await?;
            if pending.is_empty() {
                println!("Schema is up to date.");
                return Ok(());
            }
            for migration in &pending {
                println!("Applying {}", style(migration.name()).cyan());
            }
            Migrator::up(&db, None).await?;
            println!(
                "{} Applied {} migration(s).",
                style("✓").green(),
                pending.len()
            );
        }
        MigrateAction::Down => {
            Migrator::down(&db, Some(1)).await?;
            println!("{} Rolled back the last migration.", style("✓").green());
        }
        MigrateAction::Status => {
            let applied = Migrator::get_applied_migrations(&db).await?;
            let pending = Migrator::get_pending_migrations(&db).await?;
            for migration in &applied {
                println!("  {} {}", style("applied").green(), migration.name());
            }
            for migration in &pending {
                println!("  {} {}", style("pending").yellow(), migration.name());
            }
        }
        MigrateAction::Fresh => {
            tracing::warn!("Dropping all tables; tasks, events and alert history are lost");
            Migrator::fresh(&db).await?;
            println!("{} Schema recreated.", style("✓").green());
        }
    }

    Ok(())
}
