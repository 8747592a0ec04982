use std::sync::Arc;

use console::style;
use gitmirror::metrics::TracingSink;
use gitmirror::scan::{ScanResult, ScanStatus, ScanType};

use super::shared::{self, CliResult};
use crate::config::Config;

pub(crate) async fn handle_scan(full: bool, config: &Config, database_url: &str) -> CliResult<()> {
    let db = shared::open_db(database_url).await?;
    let (service, _) = shared::build_scan_service(config, db, Arc::new(TracingSink))?;

    let scan_type = if full {
        ScanType::Full
    } else {
        ScanType::Incremental
    };
    let result = service.scan(scan_type).await;
    print_result(&result);

    match result.status {
        ScanStatus::Success => Ok(()),
        ScanStatus::Failed => Err(result
            .error_message
            .unwrap_or_else(|| "scan failed".to_string())
            .into()),
    }
}

fn print_result(result: &ScanResult) {
    let status = match result.status {
        ScanStatus::Success => style(result.status.as_str()).green(),
        ScanStatus::Failed => style(result.status.as_str()).red(),
    };
    println!(
        "{} scan {} in {}ms",
        style(result.scan_type).bold(),
        status,
        result.duration_ms
    );
    println!("  projects scanned:  {}", result.projects_scanned);
    println!("  new projects:      {}", result.new_projects);
    println!("  changes detected:  {}", result.changes_detected);
    println!("  alerts created:    {}", result.alerts_created);
    println!("  alerts resolved:   {}", result.alerts_resolved);
    if result.deleted_projects > 0 {
        println!(
            "  deleted projects:  {}",
            style(result.deleted_projects).yellow()
        );
    }
    if let Some(error) = &result.error_message {
        println!("  error: {}", style(error).red());
    }
}
