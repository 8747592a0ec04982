//! Persistence operations for sync projects, tasks and events.
//!
//! Alerts are persisted by [`crate::alert`], which owns their dedup rules.

mod errors;
pub mod event;
pub mod project;
pub mod task;

pub use errors::{Result, StoreError};
pub use event::NewEvent;
pub use project::InitializedProject;
