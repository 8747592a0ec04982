//! Push-only metrics sink.
//!
//! Library code reports through [`MetricsSink`]; the binary decides where the
//! numbers go. [`FacadeSink`] forwards to the `metrics` crate, so installing a
//! Prometheus recorder is enough to export everything.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::cache::CacheStats;
use crate::entity::monitor_alert::Severity;
use crate::entity::sync_task::TaskType;

pub type Labels<'a> = &'a [(&'static str, String)];

/// Destination for counters, gauges and histograms. Calls never fail.
pub trait MetricsSink: Send + Sync {
    fn counter(&self, name: &'static str, labels: Labels<'_>, value: u64);

    fn gauge(&self, name: &'static str, labels: Labels<'_>, value: f64);

    fn histogram(&self, name: &'static str, labels: Labels<'_>, value: f64);
}

/// Forwards to the global `metrics` recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct FacadeSink;

fn to_labels(labels: Labels<'_>) -> Vec<::metrics::Label> {
    labels
        .iter()
        .map(|(key, value)| ::metrics::Label::new(*key, value.clone()))
        .collect()
}

impl MetricsSink for FacadeSink {
    fn counter(&self, name: &'static str, labels: Labels<'_>, value: u64) {
        ::metrics::counter!(name, to_labels(labels)).increment(value);
    }

    fn gauge(&self, name: &'static str, labels: Labels<'_>, value: f64) {
        ::metrics::gauge!(name, to_labels(labels)).set(value);
    }

    fn histogram(&self, name: &'static str, labels: Labels<'_>, value: f64) {
        ::metrics::histogram!(name, to_labels(labels)).record(value);
    }
}

/// Logs every sample at trace level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn counter(&self, name: &'static str, labels: Labels<'_>, value: u64) {
        tracing::trace!(metric = name, ?labels, value, "counter");
    }

    fn gauge(&self, name: &'static str, labels: Labels<'_>, value: f64) {
        tracing::trace!(metric = name, ?labels, value, "gauge");
    }

    fn histogram(&self, name: &'static str, labels: Labels<'_>, value: f64) {
        tracing::trace!(metric = name, ?labels, value, "histogram");
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn counter(&self, _: &'static str, _: Labels<'_>, _: u64) {}
    fn gauge(&self, _: &'static str, _: Labels<'_>, _: f64) {}
    fn histogram(&self, _: &'static str, _: Labels<'_>, _: f64) {}
}

#[derive(Debug, Default)]
struct Recorded {
    counters: BTreeMap<String, u64>,
    gauges: BTreeMap<String, f64>,
    histograms: BTreeMap<String, Vec<f64>>,
}

/// Keeps every sample in memory, keyed as `name{k=v,...}`.
#[derive(Debug, Default)]
pub struct InMemorySink {
    recorded: Mutex<Recorded>,
}

fn series_key(name: &str, labels: Labels<'_>) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let rendered: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{name}{{{}}}", rendered.join(","))
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter_value(&self, key: &str) -> Option<u64> {
        self.lock().counters.get(key).copied()
    }

    pub fn gauge_value(&self, key: &str) -> Option<f64> {
        self.lock().gauges.get(key).copied()
    }

    pub fn histogram_values(&self, key: &str) -> Vec<f64> {
        self.lock().histograms.get(key).cloned().unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetricsSink for InMemorySink {
    fn counter(&self, name: &'static str, labels: Labels<'_>, value: u64) {
        *self
            .lock()
            .counters
            .entry(series_key(name, labels))
            .or_default() += value;
    }

    fn gauge(&self, name: &'static str, labels: Labels<'_>, value: f64) {
        self.lock().gauges.insert(series_key(name, labels), value);
    }

    fn histogram(&self, name: &'static str, labels: Labels<'_>, value: f64) {
        self.lock()
            .histograms
            .entry(series_key(name, labels))
            .or_default()
            .push(value);
    }
}

// ─── Metric Names ────────────────────────────────────────────────────────────

pub const SYNC_RUNS_TOTAL: &str = "gitmirror_sync_runs_total";
pub const SYNC_DURATION_SECONDS: &str = "gitmirror_sync_duration_seconds";
pub const SYNC_RUNNING: &str = "gitmirror_sync_running";
pub const SYNC_CAPACITY: &str = "gitmirror_sync_capacity";
pub const WEBHOOK_EVENTS_TOTAL: &str = "gitmirror_webhook_events_total";
pub const SCAN_DURATION_SECONDS: &str = "gitmirror_scan_duration_seconds";
pub const SCAN_RUNS_TOTAL: &str = "gitmirror_scan_runs_total";
pub const PROJECTS_SCANNED: &str = "gitmirror_projects_scanned";
pub const PROJECTS_BY_STATUS: &str = "gitmirror_projects_by_status";
pub const ALERTS_ACTIVE: &str = "gitmirror_alerts_active";
pub const CACHE_ENTRIES: &str = "gitmirror_cache_entries";
pub const CACHE_HIT_RATE: &str = "gitmirror_cache_hit_rate_percent";

// ─── Helpers ─────────────────────────────────────────────────────────────────

pub fn record_sync_run(sink: &dyn MetricsSink, task_type: TaskType, success: bool, elapsed: Duration) {
    let status = if success { "success" } else { "failed" };
    sink.counter(
        SYNC_RUNS_TOTAL,
        &[("task_type", task_type.to_string()), ("status", status.to_string())],
        1,
    );
    sink.histogram(
        SYNC_DURATION_SECONDS,
        &[("task_type", task_type.to_string())],
        elapsed.as_secs_f64(),
    );
}

pub fn record_budget(sink: &dyn MetricsSink, capacity: usize, running: usize) {
    sink.gauge(SYNC_CAPACITY, &[], capacity as f64);
    sink.gauge(SYNC_RUNNING, &[], running as f64);
}

pub fn record_webhook(sink: &dyn MetricsSink, decision: &str) {
    sink.counter(WEBHOOK_EVENTS_TOTAL, &[("decision", decision.to_string())], 1);
}

pub fn record_alert_counts(sink: &dyn MetricsSink, counts: &BTreeMap<Severity, u64>) {
    for (severity, count) in counts {
        sink.gauge(ALERTS_ACTIVE, &[("severity", severity.to_string())], *count as f64);
    }
}

pub fn record_cache(sink: &dyn MetricsSink, stats: &CacheStats) {
    sink.gauge(CACHE_ENTRIES, &[], stats.size as f64);
    sink.gauge(CACHE_HIT_RATE, &[], stats.hit_rate);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_sink_accumulates_counters_and_overwrites_gauges() {
        let sink = InMemorySink::new();
        sink.counter("runs", &[("status", "ok".into())], 1);
        sink.counter("runs", &[("status", "ok".into())], 2);
        sink.gauge("running", &[], 3.0);
        sink.gauge("running", &[], 1.0);

        assert_eq!(sink.counter_value("runs{status=ok}"), Some(3));
        assert_eq!(sink.gauge_value("running"), Some(1.0));
        assert_eq!(sink.counter_value("runs"), None);
    }

    #[test]
    fn sync_run_helper_labels_by_type_and_status() {
        let sink = InMemorySink::new();
        record_sync_run(&sink, TaskType::Push, false, Duration::from_millis(1500));

        assert_eq!(
            sink.counter_value("gitmirror_sync_runs_total{task_type=push,status=failed}"),
            Some(1)
        );
        assert_eq!(
            sink.histogram_values("gitmirror_sync_duration_seconds{task_type=push}"),
            vec![1.5]
        );
    }

    #[test]
    fn alert_counts_emit_one_gauge_per_severity() {
        let sink = InMemorySink::new();
        let counts = BTreeMap::from([(Severity::Critical, 2), (Severity::Low, 0)]);
        record_alert_counts(&sink, &counts);

        assert_eq!(sink.gauge_value("gitmirror_alerts_active{severity=critical}"), Some(2.0));
        assert_eq!(sink.gauge_value("gitmirror_alerts_active{severity=low}"), Some(0.0));
    }

    #[test]
    fn facade_and_noop_sinks_accept_samples_without_recorder() {
        FacadeSink.counter("c", &[("k", "v".into())], 1);
        FacadeSink.gauge("g", &[], 1.0);
        FacadeSink.histogram("h", &[], 1.0);
        NoopSink.counter("c", &[], 1);
        TracingSink.gauge("g", &[], 1.0);
    }
}
