//! Process termination control call.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{instrument, warn};

use crate::state::SharedState;
use crate::terminate::TerminateError;

#[derive(Serialize)]
struct KillAccepted {
    success: bool,
}

#[derive(Serialize)]
struct KillRejected {
    error: String,
}

/// Handler for POST /api/processes/{pid}/terminate.
///
/// Answers as soon as the graceful signal dispatches; the grace-period
/// escalation continues in the background. The status code distinguishes bad
/// input, absent target, missing privilege and internal failure so the
/// dashboard can tell the user which one happened.
#[instrument(skip(state))]
pub async fn terminate_handler(
    State(state): State<SharedState>,
    Path(pid): Path<String>,
) -> Response {
    let pid: u32 = match pid.parse() {
        Ok(pid) if pid > 0 => pid,
        _ => return reject(StatusCode::BAD_REQUEST, format!("invalid pid '{pid}'")),
    };

    match state.controller.terminate(pid).await {
        Ok(()) => Json(KillAccepted { success: true }).into_response(),
        Err(e @ TerminateError::NotFound(_)) => reject(StatusCode::NOT_FOUND, e.to_string()),
        Err(e @ TerminateError::PermissionDenied(_)) => {
            reject(StatusCode::FORBIDDEN, e.to_string())
        }
        Err(e) => {
            warn!("termination failed: {e}");
            reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn reject(status: StatusCode, error: String) -> Response {
    (status, Json(KillRejected { error })).into_response()
}
