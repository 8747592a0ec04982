//! gitmirror CLI - runs and inspects the GitLab mirror service.

mod commands;
mod config;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gitmirror")]
#[command(version)]
#[command(about = "Keep GitLab-to-GitLab repository mirrors in sync")]
#[command(
    long_about = "gitmirror schedules sync tasks between a source and a target GitLab \
instance, periodically compares both sides, and raises alerts when a mirror \
falls behind, diverges, or disappears."
)]
#[command(after_long_help = r#"EXAMPLES
    Create or upgrade the database schema:
        $ gitmirror migrate up

    Run the scheduler, periodic scans and the metrics endpoint:
        $ gitmirror run

    Run a one-off full consistency scan:
        $ gitmirror scan --full

    Retry every task of a project now:
        $ gitmirror task retry platform/api

    Feed a GitLab push payload through the debounce gate:
        $ gitmirror webhook push.json

CONFIGURATION
    gitmirror reads configuration from:
      1. ~/.config/gitmirror/config.toml (or $XDG_CONFIG_HOME/gitmirror/config.toml)
      2. ./gitmirror.toml
      3. Environment variables (GITMIRROR_* prefix, nested keys joined with __)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    GITMIRROR_DATABASE__URL     Database connection string (default: ~/.local/state/gitmirror/gitmirror.db)
    GITMIRROR_SOURCE__HOST      Source GitLab host
    GITMIRROR_SOURCE__TOKEN     Source GitLab access token
    GITMIRROR_TARGET__HOST      Target GitLab host
    GITMIRROR_TARGET__TOKEN     Target GitLab access token
    RUST_LOG                    Log filter (default: gitmirror=info,gitmirror_cli=info)
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Run the scheduler and periodic scans until interrupted
    Run,
    /// Run a single consistency scan and print the result
    Scan {
        /// Compare every project instead of recently active ones
        #[arg(long)]
        full: bool,
    },
    /// Inspect and steer sync tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Inspect and manage drift alerts
    Alert {
        #[command(subcommand)]
        action: AlertAction,
    },
    /// Process a GitLab push event payload
    Webhook {
        /// Path to the JSON payload, or "-" for stdin
        payload: PathBuf,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
    /// Fresh install - drop all tables and reapply migrations
    Fresh,
}

#[derive(Subcommand)]
enum TaskAction {
    /// List every task with its project, soonest first
    List,
    /// Make every task of a project due now
    Retry {
        /// Project key, e.g. "group/project"
        project: String,
    },
    /// Clear failure counters and re-enable a project
    Reset {
        /// Project key, e.g. "group/project"
        project: String,
    },
}

#[derive(Subcommand)]
enum AlertAction {
    /// List alerts, newest first
    List {
        /// Only alerts with this status
        #[arg(short, long, value_enum)]
        status: Option<AlertStatusArg>,

        /// Maximum number of alerts to show
        #[arg(short, long, default_value_t = 50)]
        limit: u64,
    },
    /// Resolve an alert
    Resolve {
        /// Alert ID
        id: uuid::Uuid,
    },
    /// Mute an alert for a number of minutes
    Mute {
        /// Alert ID
        id: uuid::Uuid,

        #[arg(short, long)]
        minutes: i64,
    },
    /// Delete resolved alerts past the retention period
    Purge,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AlertStatusArg {
    Active,
    Resolved,
    Muted,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("gitmirror=info,gitmirror_cli=info"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    // Load configuration (config files -> env vars -> defaults)
    let config = config::Config::load();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        commands::meta::handle_completions(*shell)?;
        return Ok(());
    }

    let database_url = config
        .database_url()
        .ok_or("Could not determine a database URL; set database.url")?;

    // Ensure the database directory exists for SQLite
    if database_url.starts_with("sqlite://") {
        let db_path = database_url.trim_start_matches("sqlite://");
        // Strip query parameters (e.g., ?mode=rwc) before path operations
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        let db_path = std::path::Path::new(db_path);

        if db_path.is_relative() && !db_path.as_os_str().is_empty() {
            tracing::warn!(
                "Database path '{}' is relative - behavior depends on current directory. \
                 Consider using an absolute path.",
                db_path.display()
            );
        }

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
    }

    match cli.command {
        Commands::Migrate { action } => {
            commands::migrate::handle_migrate(action, &database_url).await?;
        }
        Commands::Run => {
            commands::run::handle_run(&config, &database_url).await?;
        }
        Commands::Scan { full } => {
            commands::scan::handle_scan(full, &config, &database_url).await?;
        }
        Commands::Task { action } => {
            commands::task::handle_task(action, &database_url).await?;
        }
        Commands::Alert { action } => {
            commands::alert::handle_alert(action, &config, &database_url).await?;
        }
        Commands::Webhook { payload } => {
            commands::webhook::handle_webhook(&payload, &config, &database_url).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
