//! Configuration file support for gitmirror.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. Environment variables (prefixed with `GITMIRROR_`, nested keys joined
//!    with `__`, e.g. `GITMIRROR_SOURCE__TOKEN`)
//! 2. `./gitmirror.toml`
//! 3. `~/.config/gitmirror/config.toml`
//! 4. Built-in defaults
//!
//! The database URL defaults to `sqlite://~/.local/state/gitmirror/gitmirror.db`
//! on Linux (using the XDG state directory) if not explicitly configured.
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "postgres://localhost/gitmirror"
//!
//! [source]
//! host = "gitlab.internal"
//! token = "glpat-..."
//! group = "platform"
//!
//! [target]
//! host = "gitlab.backup"
//! token = "glpat-..."
//!
//! [scheduler.concurrency]
//! peak_hours = "9-18"
//! peak_max_concurrent = 3
//! off_peak_max_concurrent = 8
//!
//! [monitor.thresholds]
//! sync_delay_minutes = 30
//!
//! [monitor.scan]
//! interval_secs = 300
//! full_scan_every = 12
//!
//! [metrics]
//! listen = "0.0.0.0:9464"
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

use gitmirror::alert::AlertConfig;
use gitmirror::batch::BatchConfig;
use gitmirror::gitlab::GitLabHostConfig;
use gitmirror::scan::ScanConfig;
use gitmirror::scheduler::SchedulerConfig;
use gitmirror::threshold::ThresholdConfig;
use gitmirror::webhook::WebhookConfig;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    /// The host whose projects are mirrored.
    pub source: GitLabHostConfig,
    /// The host receiving the mirrors.
    pub target: GitLabHostConfig,
    pub scheduler: SchedulerConfig,
    pub monitor: MonitorConfig,
    pub batch: BatchConfig,
    pub webhook: WebhookConfig,
    pub cache: CacheConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Supports sqlite:// and postgres:// schemes.
    pub url: Option<String>,
}

/// Drift detection and alerting.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub thresholds: ThresholdConfig,
    pub alerts: AlertConfig,
    pub scan: ScanConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds between expired-entry sweeps.
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: 300,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve a Prometheus scrape endpoint during `run`.
    pub enabled: bool,
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: SocketAddr::from(([0, 0, 0, 0], 9464)),
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// A file or variable that fails to parse is logged and the built-in
    /// defaults are used instead.
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("gitmirror.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./gitmirror.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("GITMIRROR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Get the database URL, falling back to the default state directory path.
    ///
    /// The `mode=rwc` parameter creates the SQLite file if it doesn't exist.
    pub fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| {
                let db_path = state_dir.join("gitmirror.db");
                format!("sqlite://{}?mode=rwc", db_path.display())
            })
        })
    }

    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "gitmirror").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// On Linux, this is `$XDG_STATE_HOME/gitmirror` or `~/.local/state/gitmirror`.
    /// On macOS/Windows, falls back to the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "gitmirror").map(|dirs| {
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}
