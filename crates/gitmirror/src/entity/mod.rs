//! SeaORM entity definitions for the gitmirror database schema.

pub mod monitor_alert;
pub mod prelude;
pub mod pull_sync_config;
pub mod sync_event;
pub mod sync_project;
pub mod sync_task;
