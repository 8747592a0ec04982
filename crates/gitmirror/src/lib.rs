//! gitmirror - scheduling, consistency checking and alerting for
//! GitLab-to-GitLab repository mirrors.
//!
//! The library has two independent paths over one database:
//!
//! - **Sync**: [`webhook`] pushes and the [`scheduler`] tick make tasks due,
//!   claim them and hand them to a [`executor::SyncExecutor`].
//! - **Monitor**: [`scan`] lists both hosts through [`batch`], compares them
//!   with [`diff`], turns drift into alerts via [`threshold`] and [`alert`],
//!   and reports through [`metrics`].
//!
//! # Features
//!
//! - `sqlite` / `postgres` - database backends
//! - `migrate` - enables [`migration`] and [`connect_and_migrate`]
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gitmirror::scheduler::{Executors, Scheduler, SchedulerConfig};
//!
//! let db = Arc::new(gitmirror::connect_and_migrate("sqlite://gitmirror.db?mode=rwc").await?);
//! let scheduler = Scheduler::new(db, SchedulerConfig::default(), executors, metrics);
//! let report = scheduler.tick(chrono::Utc::now()).await?;
//! println!("started {} of {} due tasks", report.started, report.picked);
//! ```

pub mod alert;
pub mod batch;
pub mod cache;
pub mod db;
pub mod diff;
pub mod entity;
pub mod executor;
pub mod gitlab;
pub mod http;
pub mod metrics;
pub mod retry;
pub mod scan;
pub mod scheduler;
pub mod store;
pub mod threshold;
pub mod webhook;

#[cfg(feature = "migrate")]
pub mod migration;

pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use entity::prelude::*;
