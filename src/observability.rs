use std::io;
use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total statements executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "registrar_queries_total";

/// Histogram: statement latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "registrar_query_duration_seconds";

/// Counter: schedule admissions by outcome. Labels: op, outcome.
pub const ADMISSIONS_TOTAL: &str = "registrar_admissions_total";

/// Histogram: admission latency in seconds, lock waits included. Labels: op.
pub const ADMISSION_DURATION_SECONDS: &str = "registrar_admission_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

pub const CONNECTIONS_ACTIVE: &str = "registrar_connections_active";

pub const CONNECTIONS_TOTAL: &str = "registrar_connections_total";

/// Counter: connections refused at the connection limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "registrar_connections_rejected_total";

/// Gauge: loaded tenant engines.
pub const TENANTS_ACTIVE: &str = "registrar_tenants_active";

/// Counter: logins with an unknown user. Wrong passwords are counted by the client side.
pub const AUTH_FAILURES_TOTAL: &str = "registrar_auth_failures_total";

pub const WAL_FLUSH_DURATION_SECONDS: &str = "registrar_wal_flush_duration_seconds";

/// Histogram: events per group-commit flush.
pub const WAL_FLUSH_BATCH_SIZE: &str = "registrar_wal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op if port is None.
pub fn init(port: Option<u16>) -> io::Result<()> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| io::Error::other(format!("metrics exporter: {e}")))?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label of a command for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertTeacher { .. } => "insert_teacher",
        Command::UpdateTeacher { .. } => "update_teacher",
        Command::DeleteTeacher { .. } => "delete_teacher",
        Command::SelectTeachers { .. } => "select_teachers",
        Command::InsertClassroom { .. } => "insert_classroom",
        Command::UpdateClassroom { .. } => "update_classroom",
        Command::DeleteClassroom { .. } => "delete_classroom",
        Command::SelectClassrooms { .. } => "select_classrooms",
        Command::InsertCourse { .. } => "insert_course",
        Command::UpdateCourse { .. } => "update_course",
        Command::DeleteCourse { .. } => "delete_course",
        Command::SelectCourses { .. } => "select_courses",
        Command::InsertStudent { .. } => "insert_student",
        Command::UpdateStudent { .. } => "update_student",
        Command::DeleteStudent { .. } => "delete_student",
        Command::SelectStudents { .. } => "select_students",
        Command::InsertSchedule { .. } => "insert_schedule",
        Command::UpdateSchedule { .. } => "update_schedule",
        Command::DeleteSchedule { .. } => "delete_schedule",
        Command::SelectSchedules { .. } => "select_schedules",
        Command::SelectConflicts { .. } => "select_conflicts",
        Command::Listen { .. } => "listen",
        Command::Unlisten { .. } => "unlisten",
    }
}
