use chrono::Utc;
use console::style;
use gitmirror::alert::AlertManager;
use gitmirror::entity::monitor_alert::AlertStatus;

use super::shared::{self, CliResult};
use crate::config::Config;
use crate::{AlertAction, AlertStatusArg};

impl From<AlertStatusArg> for AlertStatus {
    fn from(arg: AlertStatusArg) -> Self {
        match arg {
            AlertStatusArg::Active => AlertStatus::Active,
            AlertStatusArg::Resolved => AlertStatus::Resolved,
            AlertStatusArg::Muted => AlertStatus::Muted,
        }
    }
}

pub(crate) async fn handle_alert(
    action: AlertAction,
    config: &Config,
    database_url: &str,
) -> CliResult<()> {
    let db = shared::open_db(database_url).await?;
    let alerts = AlertManager::new(db, config.monitor.alerts.clone());

    match action {
        AlertAction::List { status, limit } => {
            let rows = alerts.list(status.map(AlertStatus::from), limit).await?;
            if rows.is_empty() {
                println!("No alerts.");
                return Ok(());
            }
            for alert in rows {
                println!(
                    "{} [{}] {} {} ({})",
                    style(alert.id).dim(),
                    shared::styled_severity(alert.severity),
                    style(&alert.project_key).bold(),
                    alert.title,
                    alert.status,
                );
                println!(
                    "    {} - triggered {}",
                    alert.description,
                    alert.triggered_at.format("%Y-%m-%d %H:%M:%S %z")
                );
            }
        }
        AlertAction::Resolve { id } => {
            let alert = alerts.resolve_alert(id, Utc::now()).await?;
            println!(
                "{} Resolved {} alert for {}",
                style("✓").green(),
                alert.alert_type,
                style(&alert.project_key).bold()
            );
        }
        AlertAction::Mute { id, minutes } => {
            let alert = alerts.mute_alert(id, minutes, Utc::now()).await?;
            let until = alert
                .muted_until
                .map(|t| t.format("%Y-%m-%d %H:%M:%S %z").to_string())
                .unwrap_or_default();
            println!(
                "{} Muted {} alert for {} until {}",
                style("✓").green(),
                alert.alert_type,
                style(&alert.project_key).bold(),
                until
            );
        }
        AlertAction::Purge => {
            let deleted = alerts.purge_resolved(Utc::now()).await?;
            println!(
                "{} Deleted {} resolved alert(s) older than {} days",
                style("✓").green(),
                deleted,
                config.monitor.alerts.retention_days
            );
        }
    }

    Ok(())
}
