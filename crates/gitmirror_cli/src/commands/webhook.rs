use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use console::style;
use gitmirror::metrics::TracingSink;
use gitmirror::webhook::{PushEvent, WebhookDecision, WebhookGate};

use super::shared::{self, CliResult};
use crate::config::Config;

fn read_payload(path: &Path) -> CliResult<String> {
    if path.as_os_str() == "-" {
        let mut body = String::new();
        std::io::stdin().read_to_string(&mut body)?;
        Ok(body)
    } else {
        Ok(std::fs::read_to_string(path)?)
    }
}

pub(crate) fn parse_payload(body: &str) -> CliResult<PushEvent> {
    Ok(serde_json::from_str(body)?)
}

pub(crate) async fn handle_webhook(
    payload: &Path,
    config: &Config,
    database_url: &str,
) -> CliResult<()> {
    let push = parse_payload(&read_payload(payload)?)?;

    let db = shared::open_db(database_url).await?;
    let gate = WebhookGate::new(db, config.webhook.clone(), Arc::new(TracingSink));
    let outcome = gate.handle_push(&push, Utc::now()).await?;

    let decision = match outcome.decision {
        WebhookDecision::Accepted => style(outcome.decision.as_str()).green(),
        WebhookDecision::Initialized => style(outcome.decision.as_str()).cyan(),
        WebhookDecision::Debounced => style(outcome.decision.as_str()).yellow(),
    };
    println!(
        "{} {} - next run at {}",
        style(&outcome.project_key).bold(),
        decision,
        outcome.next_run_at.format("%Y-%m-%d %H:%M:%S %z")
    );
    Ok(())
}
