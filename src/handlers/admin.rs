//! Administrative handlers

use axum::{extract::State, response::Json};

use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::server::AppState;
use crate::workflow::TerminateAllReport;

pub const TERMINATE_ALL_REASON: &str = "Terminated by admin 'terminate-all' action.";

/// Request termination of every Pending or Running run
///
/// Failures on individual runs are reported, not fatal.
#[utoipa::path(
    post,
    path = "/admin/terminate-all",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Termination requested", body = TerminateAllReport),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn terminate_all(
    State(state): State<AppState>,
    _auth: OperatorAuth,
) -> Result<Json<TerminateAllReport>, ApiError> {
    let report = state.engine.terminate_all_active(TERMINATE_ALL_REASON).await?;
    tracing::info!(
        terminated = report.terminated.len(),
        failed = report.failures.len(),
        "Terminate-all processed"
    );
    Ok(Json(report))
}
