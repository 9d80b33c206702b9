use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "daygrid_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "daygrid_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "daygrid_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "daygrid_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "daygrid_connections_rejected_total";

// ── Store ────────────────────────────────────────────────────────

/// Counter: appointments inserted or replaced.
pub const APPOINTMENTS_UPSERTED_TOTAL: &str = "daygrid_appointments_upserted_total";

/// Counter: manager room edits applied.
pub const ROOM_UPDATES_TOTAL: &str = "daygrid_room_updates_total";

/// Histogram: events returned per day view.
pub const DAY_VIEW_EVENTS: &str = "daygrid_day_view_events";

/// Gauge: appointments held in memory.
pub const APPOINTMENTS_STORED: &str = "daygrid_appointments_stored";

/// Gauge: days held in memory.
pub const DAYS_STORED: &str = "daygrid_days_stored";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Publish the store size gauges.
pub fn record_store(engine: &crate::engine::Engine) {
    metrics::gauge!(APPOINTMENTS_STORED).set(engine.appointment_count() as f64);
    metrics::gauge!(DAYS_STORED).set(engine.day_count() as f64);
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::UpsertAppointments(_) => "upsert_appointments",
        Command::UpdateRoom { .. } => "update_room",
        Command::DeleteAppointment { .. } => "delete_appointment",
        Command::SelectEvents { .. } => "select_events",
        Command::SelectDay { .. } => "select_day",
        Command::SelectTherapists { .. } => "select_therapists",
        Command::SelectSlots { .. } => "select_slots",
        Command::SelectUnassigned { .. } => "select_unassigned",
        Command::SelectStatus => "select_status",
    }
}
