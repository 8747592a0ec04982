use std::sync::Arc;

use gitmirror::metrics::{FacadeSink, MetricsSink, NoopSink};
use gitmirror::scan::spawn_periodic_scan;
use gitmirror::scheduler::Scheduler;
use metrics_exporter_prometheus::PrometheusBuilder;

use super::shared::{self, CliResult};
use crate::config::Config;
use crate::shutdown;

/// Run the dispatcher, the periodic scan and the cache sweep until Ctrl+C.
pub(crate) async fn handle_run(config: &Config, database_url: &str) -> CliResult<()> {
    let metrics: Arc<dyn MetricsSink> = if config.metrics.enabled {
        PrometheusBuilder::new()
            .with_http_listener(config.metrics.listen)
            .install()?;
        tracing::info!(listen = %config.metrics.listen, "Serving Prometheus metrics");
        Arc::new(FacadeSink)
    } else {
        Arc::new(NoopSink)
    };

    let db = shared::open_db(database_url).await?;
    let executors = shared::build_executors(config)?;
    let (scan_service, diffs) = shared::build_scan_service(config, Arc::clone(&db), Arc::clone(&metrics))?;

    let shutdown_rx = shutdown::setup_shutdown_handler();

    let scheduler = Scheduler::new(db, config.scheduler.clone(), executors, metrics);
    tracing::info!(
        source = %config.source.host,
        target = %config.target.host,
        tick_secs = config.scheduler.tick_interval_secs,
        scan_secs = config.monitor.scan.interval_secs,
        "gitmirror started"
    );

    let handles = [
        scheduler.spawn(shutdown_rx.clone()),
        spawn_periodic_scan(scan_service, shutdown_rx.clone()),
        diffs.spawn_cleanup(shared::cleanup_interval(config), shutdown_rx.clone()),
    ];

    shutdown::wait_for_shutdown(shutdown_rx).await;

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!("Background task panic: {}", e);
        }
    }

    tracing::info!("gitmirror stopped");
    Ok(())
}
