use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: statements executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "classd_queries_total";

/// Histogram: statement latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "classd_query_duration_seconds";

/// Counter: schedule entries created.
pub const SCHEDULES_CREATED_TOTAL: &str = "classd_schedules_created_total";

/// Counter: create requests refused. Labels: code.
pub const SCHEDULE_REJECTIONS_TOTAL: &str = "classd_schedule_rejections_total";

/// Counter: schedule entries cancelled.
pub const SCHEDULES_CANCELLED_TOTAL: &str = "classd_schedules_cancelled_total";

/// Histogram: end-to-end create latency in seconds, lock wait included.
pub const SCHEDULE_CREATE_DURATION_SECONDS: &str = "classd_schedule_create_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: open client connections.
pub const CONNECTIONS_ACTIVE: &str = "classd_connections_active";

/// Counter: connections accepted.
pub const CONNECTIONS_TOTAL: &str = "classd_connections_total";

/// Counter: connections refused at the limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "classd_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "classd_wal_flush_duration_seconds";

/// Histogram: events per WAL flush.
pub const WAL_FLUSH_BATCH_SIZE: &str = "classd_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "classd_wal_compactions_total";

/// Install the Prometheus exporter on `port`. No-op if `port` is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short metrics label for a command.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertResource { .. } => "insert_resource",
        Command::DeactivateResource { .. } => "deactivate_resource",
        Command::SelectResources { .. } => "select_resources",
        Command::InsertSchedule { .. } => "insert_schedule",
        Command::CancelSchedule { .. } => "cancel_schedule",
        Command::SelectSchedules { .. } => "select_schedules",
    }
}
