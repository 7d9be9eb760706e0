//! Health check endpoint handler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use std::fmt::Write as FmtWrite;
use tokio::time::Duration;
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Handler for the /health endpoint.
///
/// Reports 503 until the first metrics snapshot has been sampled, so load
/// balancers hold traffic back during warm-up.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    let metrics_age = state.cache.metrics_age().await;
    let processes_age = state.cache.processes_age().await;
    let sessions = state.broadcaster.session_count().await;
    let uptime = state.started_at.elapsed();

    let status = if metrics_age.is_some() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let message = if metrics_age.is_some() {
        "OK"
    } else {
        "No snapshot sampled yet"
    };

    let mut table = String::new();
    writeln!(table, "{:24} | {:>14}", "metric", "value").ok();
    writeln!(table, "{}", "-".repeat(41)).ok();
    writeln!(table, "{:24} | {:>14}", "uptime (s)", uptime.as_secs()).ok();
    writeln!(table, "{:24} | {:>14}", "connected sessions", sessions).ok();
    writeln!(
        table,
        "{:24} | {:>14}",
        "metrics snapshot age (s)",
        render_age(metrics_age)
    )
    .ok();
    writeln!(
        table,
        "{:24} | {:>14}",
        "process list age (s)",
        render_age(processes_age)
    )
    .ok();

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!("{message}\n\n{table}"),
    )
}

fn render_age(age: Option<Duration>) -> String {
    match age {
        Some(age) => format!("{:.1}", age.as_secs_f64()),
        None => "never".to_string(),
    }
}
