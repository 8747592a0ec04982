//! Success cadence and failure backoff.

use std::collections::HashMap;

use chrono::Duration;
use serde::Deserialize;

use crate::entity::pull_sync_config::Priority;

const BACKOFF_BASE_MINUTES: i64 = 5;
const BACKOFF_MAX_EXPONENT: i32 = 5;

/// Priority to sync-interval lookup table, in minutes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CadenceTable {
    pub intervals_minutes: HashMap<String, i64>,
    /// Used for a missing or unlisted priority.
    pub default_minutes: i64,
}

impl Default for CadenceTable {
    fn default() -> Self {
        let intervals_minutes = [
            (Priority::Critical, 10),
            (Priority::High, 30),
            (Priority::Normal, 120),
            (Priority::Low, 360),
        ]
        .into_iter()
        .map(|(p, m)| (p.as_str().to_string(), m))
        .collect();

        Self {
            intervals_minutes,
            default_minutes: 120,
        }
    }
}

impl CadenceTable {
    /// Interval until the next run after a success.
    pub fn interval_for(&self, priority: Option<Priority>) -> Duration {
        let minutes = priority
            .and_then(|p| self.intervals_minutes.get(p.as_str()))
            .copied()
            .unwrap_or(self.default_minutes);
        Duration::minutes(minutes)
    }
}

/// Delay before retrying after `consecutive_failures` failures:
/// 5 minutes doubled per failure, capped at 160 minutes.
pub fn failure_backoff(consecutive_failures: i32) -> Duration {
    let exponent = consecutive_failures.clamp(0, BACKOFF_MAX_EXPONENT) as u32;
    Duration::minutes(BACKOFF_BASE_MINUTES * 2i64.pow(exponent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_intervals_per_priority() {
        let table = CadenceTable::default();
        let minutes = |p| table.interval_for(p).num_minutes();
        assert_eq!(minutes(Some(Priority::Critical)), 10);
        assert_eq!(minutes(Some(Priority::High)), 30);
        assert_eq!(minutes(Some(Priority::Normal)), 120);
        assert_eq!(minutes(Some(Priority::Low)), 360);
        assert_eq!(minutes(None), 120);
    }

    #[test]
    fn unlisted_priority_uses_default() {
        let table = CadenceTable {
            intervals_minutes: HashMap::from([("critical".to_string(), 1)]),
            default_minutes: 45,
        };
        assert_eq!(table.interval_for(Some(Priority::Critical)).num_minutes(), 1);
        assert_eq!(table.interval_for(Some(Priority::Low)).num_minutes(), 45);
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let minutes: Vec<i64> = (0..=7).map(|n| failure_backoff(n).num_minutes()).collect();
        assert_eq!(minutes, vec![5, 10, 20, 40, 80, 160, 160, 160]);
    }

    #[test]
    fn negative_failure_count_is_base_delay() {
        assert_eq!(failure_backoff(-3).num_minutes(), 5);
    }
}
