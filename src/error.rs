//! # Error Handling
//!
//! Two families of errors live here:
//!
//! * [`ApiError`], the problem+json body returned by every HTTP handler.
//! * [`IngestError`] and [`FailureKind`], the failure taxonomy shared by
//!   activities, the retry policy and the workflow engine.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, RuntimeErr};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::telemetry;
use crate::workflow::EngineError;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

impl From<DbErr> for ApiError {
    fn from(error: DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            _ => {
                tracing::error!("Database error: {:?}", error);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::RunNotFound(id) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Run {} not found", id),
            ),
            EngineError::UnknownDefinition(name) => Self::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                &format!("Unknown workflow definition '{}'", name),
            ),
            EngineError::InvalidInput { definition, message } => Self::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                &format!("Invalid input for '{}': {}", definition, message),
            ),
            EngineError::Store(db_err) => db_err.into(),
            other => {
                tracing::error!(error = %other, "Workflow engine error");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Workflow engine error",
                )
            }
        }
    }
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create a not found error (404)
pub fn not_found(message: &str) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

/// Whether a failure is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Transient,
    Permanent,
}

/// Failure category recorded with every failed activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Lock, serialization or uniqueness race in the store
    TransientStore,
    /// Any other store failure
    PermanentStore,
    /// Timeouts, 5xx and rate limiting from the upstream API
    TransientUpstream,
    /// Not found, malformed payloads and other 4xx responses
    PermanentUpstream,
    /// Missing identifiers or unresolvable parents on a single work item
    Validation,
    /// Irrecoverable engine or wiring failure
    EngineFatal,
}

impl FailureKind {
    pub fn classification(self) -> Classification {
        match self {
            FailureKind::TransientStore | FailureKind::TransientUpstream => {
                Classification::Transient
            }
            _ => Classification::Permanent,
        }
    }
}

/// Errors raised while executing an activity body.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("store conflict: {0}")]
    TransientStore(#[source] DbErr),
    #[error("store error: {0}")]
    Store(#[source] DbErr),
    #[error("upstream unavailable: {0}")]
    TransientUpstream(String),
    #[error("upstream rejected request: {0}")]
    PermanentUpstream(String),
    #[error("invalid record: {0}")]
    Validation(String),
    #[error("{0}")]
    Fatal(String),
}

impl IngestError {
    pub fn validation(message: impl Into<String>) -> Self {
        IngestError::Validation(message.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            IngestError::TransientStore(_) => FailureKind::TransientStore,
            IngestError::Store(_) => FailureKind::PermanentStore,
            IngestError::TransientUpstream(_) => FailureKind::TransientUpstream,
            IngestError::PermanentUpstream(_) => FailureKind::PermanentUpstream,
            IngestError::Validation(_) => FailureKind::Validation,
            IngestError::Fatal(_) => FailureKind::EngineFatal,
        }
    }

    /// Default classifier handed to the retry policy.
    pub fn classification(&self) -> Classification {
        self.kind().classification()
    }
}

impl From<DbErr> for IngestError {
    fn from(error: DbErr) -> Self {
        if is_transient_store_error(&error) {
            IngestError::TransientStore(error)
        } else {
            IngestError::Store(error)
        }
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(error: serde_json::Error) -> Self {
        IngestError::Validation(format!("malformed payload: {}", error))
    }
}

fn database_error_code(error: &DbErr) -> Option<String> {
    let runtime_err = match error {
        DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | DbErr::Exec(RuntimeErr::SqlxError(sqlx_err))
        | DbErr::Conn(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return None,
    };

    runtime_err
        .as_database_error()
        .and_then(|db_error| db_error.code().map(|code| code.into_owned()))
}

pub(crate) fn is_unique_violation(error: &DbErr) -> bool {
    const PG_UNIQUE: &str = "23505";
    const MYSQL_DUPLICATE_CODES: &[&str] = &["1022", "1062", "1169", "1586"];
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    if let DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
    | DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) = error
        && let Some(db_error) = sqlx_err.as_database_error()
        && db_error.is_unique_violation()
    {
        return true;
    }

    database_error_code(error).is_some_and(|code| {
        code == PG_UNIQUE
            || MYSQL_DUPLICATE_CODES.contains(&code.as_str())
            || SQLITE_DUPLICATE_CODES.contains(&code.as_str())
    })
}

/// Lock and serialization conflicts that a fresh attempt can clear.
///
/// Unique violations count as transient: two workers upserting the same
/// network race on insert, and the loser finds the row on its next attempt.
pub fn is_transient_store_error(error: &DbErr) -> bool {
    // serialization_failure, deadlock_detected, lock_not_available
    const PG_CONFLICT_CODES: &[&str] = &["40001", "40P01", "55P03"];
    // ER_LOCK_DEADLOCK, ER_LOCK_WAIT_TIMEOUT
    const MYSQL_CONFLICT_CODES: &[&str] = &["1213", "1205"];
    // SQLITE_BUSY, SQLITE_LOCKED and their extended codes
    const SQLITE_CONFLICT_CODES: &[&str] = &["5", "6", "261", "262", "517", "773"];

    if matches!(error, DbErr::ConnectionAcquire(_)) {
        return true;
    }

    if is_unique_violation(error) {
        return true;
    }

    database_error_code(error).is_some_and(|code| {
        PG_CONFLICT_CODES.contains(&code.as_str())
            || MYSQL_CONFLICT_CODES.contains(&code.as_str())
            || SQLITE_CONFLICT_CODES.contains(&code.as_str())
    })
}
