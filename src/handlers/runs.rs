//! # Run Handlers
//!
//! Trigger endpoints that start ingestion runs, plus status, listing and
//! termination of individual runs.

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::cursor::{decode_cursor, encode_cursor};
use crate::error::{ApiError, validation_error};
use crate::server::AppState;
use crate::upstream::UpdatePeriod;
use crate::workflow::{RunCursor, RunQuery, RunSnapshot, RunStatus};
use crate::workflows::{SHOW_INGEST, SHOW_UPDATE, ShowIngestInput, ShowUpdateInput};

const DEFAULT_LIST_LIMIT: u64 = 50;
const MAX_LIST_LIMIT: u64 = 100;

/// Handle returned when a run is accepted
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunHandle {
    /// Run identifier
    pub id: Uuid,
    /// Where to poll the run status
    #[schema(example = "/runs/550e8400-e29b-41d4-a716-446655440000")]
    pub status_query_uri: String,
    /// Where to request termination
    #[schema(example = "/runs/550e8400-e29b-41d4-a716-446655440000/terminate")]
    pub terminate_uri: String,
}

impl RunHandle {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            status_query_uri: format!("/runs/{}", id),
            terminate_uri: format!("/runs/{}/terminate", id),
        }
    }
}

/// Optional overrides for a full ingest
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct IngestRequest {
    /// Maximum show records processed concurrently (1-100)
    #[schema(example = 10)]
    pub concurrency_limit: Option<usize>,
    /// Pause between pages in milliseconds
    #[schema(example = 1000)]
    pub batch_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct UpdatesQuery {
    /// Change-feed window: day, week or month (default day)
    pub period: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListRunsQuery {
    /// Comma-separated statuses (pending, running, completed, failed, terminated)
    pub status: Option<String>,
    /// Maximum number of runs to return (default: 50, max: 100)
    pub limit: Option<u64>,
    /// Opaque cursor from a previous page
    pub cursor: Option<String>,
}

/// Response payload for the run listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RunsResponse {
    pub runs: Vec<RunSnapshot>,
    /// Opaque cursor for the next page (null on the last page)
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TerminateRequest {
    /// Recorded as the run's error
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TerminateResponse {
    pub id: Uuid,
    /// Always true; already-finished runs answer 409
    pub termination_requested: bool,
}

/// Start a full catalog ingest
#[utoipa::path(
    post,
    path = "/ingest",
    security(("bearer_auth" = [])),
    request_body(content = Option<IngestRequest>, description = "Optional overrides"),
    responses(
        (status = 202, description = "Run accepted", body = RunHandle),
        (status = 400, description = "Invalid input", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "runs"
)]
pub async fn trigger_ingest(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    body: Result<Option<Json<IngestRequest>>, JsonRejection>,
) -> Result<(StatusCode, Json<RunHandle>), ApiError> {
    let request = body?.map(|Json(request)| request).unwrap_or_default();
    let input = ShowIngestInput {
        concurrency_limit: request.concurrency_limit,
        batch_delay_ms: request.batch_delay_ms,
    };
    let input = serde_json::to_value(input).map_err(anyhow::Error::from)?;

    let id = state.engine.submit(SHOW_INGEST, input).await?;
    tracing::info!(run_id = %id, "Full ingest started");
    Ok((StatusCode::ACCEPTED, Json(RunHandle::new(id))))
}

/// Start a delta sync from the upstream change feed
#[utoipa::path(
    post,
    path = "/updates",
    security(("bearer_auth" = [])),
    params(UpdatesQuery),
    responses(
        (status = 202, description = "Run accepted", body = RunHandle),
        (status = 400, description = "Unknown period", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "runs"
)]
pub async fn trigger_update(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    Query(params): Query<UpdatesQuery>,
) -> Result<(StatusCode, Json<RunHandle>), ApiError> {
    let period = match params.period.as_deref() {
        Some(value) => value.parse::<UpdatePeriod>().map_err(|message| {
            validation_error("Invalid period", json!({ "period": message }))
        })?,
        None => UpdatePeriod::default(),
    };
    let input = serde_json::to_value(ShowUpdateInput { period }).map_err(anyhow::Error::from)?;

    let id = state.engine.submit(SHOW_UPDATE, input).await?;
    tracing::info!(run_id = %id, %period, "Delta sync started");
    Ok((StatusCode::ACCEPTED, Json(RunHandle::new(id))))
}

/// Current state of a run
#[utoipa::path(
    get,
    path = "/runs/{id}",
    params(("id" = Uuid, Path, description = "Run identifier")),
    responses(
        (status = 200, description = "Run status", body = RunSnapshot),
        (status = 404, description = "Unknown run", body = ApiError)
    ),
    tag = "runs"
)]
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunSnapshot>, ApiError> {
    Ok(Json(state.engine.status(id).await?))
}

fn parse_statuses(raw: Option<&str>) -> Result<Vec<RunStatus>, ApiError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            value
                .parse::<RunStatus>()
                .map_err(|message| validation_error("Invalid status filter", json!({ "status": message })))
        })
        .collect()
}

/// List runs, newest first
#[utoipa::path(
    get,
    path = "/runs",
    security(("bearer_auth" = [])),
    params(ListRunsQuery),
    responses(
        (status = 200, description = "Page of runs", body = RunsResponse),
        (status = 400, description = "Invalid query parameters", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "runs"
)]
pub async fn list_runs(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    Query(params): Query<ListRunsQuery>,
) -> Result<Json<RunsResponse>, ApiError> {
    let limit = match params.limit {
        Some(0) => {
            return Err(validation_error(
                "Invalid limit",
                json!({ "limit": "Minimum allowed limit is 1" }),
            ));
        }
        Some(limit) if limit > MAX_LIST_LIMIT => {
            return Err(validation_error(
                "Invalid limit",
                json!({ "limit": "Maximum allowed limit is 100" }),
            ));
        }
        Some(limit) => limit,
        None => DEFAULT_LIST_LIMIT,
    };

    let after = params.cursor.as_deref().map(decode_cursor).transpose()?;
    let query = RunQuery {
        statuses: parse_statuses(params.status.as_deref())?,
        after,
        // One extra row tells whether another page exists
        limit: limit + 1,
    };

    let mut runs = state.engine.list_runs(&query).await?;
    let next_cursor = if runs.len() as u64 > limit {
        runs.truncate(limit as usize);
        match runs.last() {
            Some(last) => Some(encode_cursor(&RunCursor {
                created_at: last.created_at,
                id: last.id,
            })?),
            None => None,
        }
    } else {
        None
    };

    Ok(Json(RunsResponse { runs, next_cursor }))
}

/// Request termination of a run and its sub-runs
#[utoipa::path(
    post,
    path = "/runs/{id}/terminate",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Run identifier")),
    request_body(content = Option<TerminateRequest>, description = "Optional reason"),
    responses(
        (status = 202, description = "Termination requested", body = TerminateResponse),
        (status = 400, description = "Malformed request body", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Unknown run", body = ApiError),
        (status = 409, description = "Run already finished", body = ApiError)
    ),
    tag = "runs"
)]
pub async fn terminate_run(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    Path(id): Path<Uuid>,
    body: Result<Option<Json<TerminateRequest>>, JsonRejection>,
) -> Result<(StatusCode, Json<TerminateResponse>), ApiError> {
    let reason = body?
        .and_then(|Json(request)| request.reason)
        .filter(|reason| !reason.trim().is_empty())
        .unwrap_or_else(|| "Terminated by operator".to_string());

    if !state.engine.terminate(id, &reason).await? {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            "Run has already finished",
        ));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(TerminateResponse {
            id,
            termination_requested: true,
        }),
    ))
}
