//! Run records: lifecycle transitions, termination requests and listing.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use super::EngineError;
use crate::models::workflow_run::{self, Entity as WorkflowRun};

/// Run lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Terminated,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Terminated => "terminated",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Terminated
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "terminated" => Ok(RunStatus::Terminated),
            other => Err(format!("unknown run status '{}'", other)),
        }
    }
}

/// API view of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RunSnapshot {
    pub id: Uuid,
    pub definition: String,
    pub status: RunStatus,
    pub custom_status: Option<String>,
    #[schema(value_type = Object)]
    pub input: Value,
    #[schema(value_type = Option<Object>)]
    pub result: Option<Value>,
    pub error: Option<String>,
    pub terminate_requested: bool,
    pub parent_run_id: Option<Uuid>,
    pub created_at: DateTime<FixedOffset>,
    pub started_at: Option<DateTime<FixedOffset>>,
    pub finished_at: Option<DateTime<FixedOffset>>,
    pub updated_at: DateTime<FixedOffset>,
}

impl TryFrom<workflow_run::Model> for RunSnapshot {
    type Error = EngineError;

    fn try_from(model: workflow_run::Model) -> Result<Self, Self::Error> {
        let status = parse_status(&model)?;
        Ok(Self {
            id: model.id,
            definition: model.definition,
            status,
            custom_status: model.custom_status,
            input: model.input,
            result: model.result,
            error: model.error,
            terminate_requested: model.terminate_requested,
            parent_run_id: model.parent_run_id,
            created_at: model.created_at,
            started_at: model.started_at,
            finished_at: model.finished_at,
            updated_at: model.updated_at,
        })
    }
}

pub(crate) fn parse_status(model: &workflow_run::Model) -> Result<RunStatus, EngineError> {
    model.status.parse().map_err(|message: String| {
        EngineError::Workflow(format!("run {} has invalid status: {}", model.id, message))
    })
}

/// Keyset position for run listings (newest first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCursor {
    pub created_at: DateTime<FixedOffset>,
    pub id: Uuid,
}

/// Filter for [`RunStore::list`].
#[derive(Debug, Clone, Default)]
pub struct RunQuery {
    pub statuses: Vec<RunStatus>,
    pub after: Option<RunCursor>,
    pub limit: u64,
}

/// Persistence for `workflow_runs`.
#[derive(Debug, Clone)]
pub struct RunStore {
    db: DatabaseConnection,
}

impl RunStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        id: Uuid,
        definition: &str,
        input: Value,
        parent_run_id: Option<Uuid>,
    ) -> Result<workflow_run::Model, EngineError> {
        let now = Utc::now().fixed_offset();
        let model = workflow_run::ActiveModel {
            id: Set(id),
            definition: Set(definition.to_string()),
            input: Set(input),
            status: Set(RunStatus::Pending.as_str().to_string()),
            custom_status: Set(None),
            result: Set(None),
            error: Set(None),
            terminate_requested: Set(false),
            terminate_reason: Set(None),
            parent_run_id: Set(parent_run_id),
            created_at: Set(now),
            started_at: Set(None),
            finished_at: Set(None),
            updated_at: Set(now),
        };
        Ok(model.insert(&self.db).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<workflow_run::Model>, EngineError> {
        Ok(WorkflowRun::find_by_id(id).one(&self.db).await?)
    }

    pub async fn require(&self, id: Uuid) -> Result<workflow_run::Model, EngineError> {
        self.get(id).await?.ok_or(EngineError::RunNotFound(id))
    }

    /// Pending -> Running; keeps the first `started_at`.
    pub async fn mark_running(&self, run: workflow_run::Model) -> Result<workflow_run::Model, EngineError> {
        let now = Utc::now().fixed_offset();
        let started_at = run.started_at.unwrap_or(now);
        let mut active: workflow_run::ActiveModel = run.into();
        active.status = Set(RunStatus::Running.as_str().to_string());
        active.started_at = Set(Some(started_at));
        active.updated_at = Set(now);
        Ok(active.update(&self.db).await?)
    }

    pub async fn set_custom_status(&self, id: Uuid, custom_status: Option<String>) -> Result<(), EngineError> {
        WorkflowRun::update_many()
            .col_expr(workflow_run::Column::CustomStatus, Expr::value(custom_status))
            .col_expr(
                workflow_run::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(workflow_run::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn complete(&self, id: Uuid, result: Value) -> Result<(), EngineError> {
        self.finish(id, RunStatus::Completed, Some(result), None).await
    }

    pub async fn fail(&self, id: Uuid, error: &str) -> Result<(), EngineError> {
        self.finish(id, RunStatus::Failed, None, Some(error.to_string()))
            .await
    }

    pub async fn mark_terminated(&self, id: Uuid, reason: &str) -> Result<(), EngineError> {
        self.finish(id, RunStatus::Terminated, None, Some(reason.to_string()))
            .await
    }

    async fn finish(
        &self,
        id: Uuid,
        status: RunStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<(), EngineError> {
        let now = Utc::now().fixed_offset();
        WorkflowRun::update_many()
            .col_expr(workflow_run::Column::Status, Expr::value(status.as_str()))
            .col_expr(workflow_run::Column::Result, Expr::value(result))
            .col_expr(workflow_run::Column::Error, Expr::value(error))
            .col_expr(workflow_run::Column::FinishedAt, Expr::value(Some(now)))
            .col_expr(workflow_run::Column::UpdatedAt, Expr::value(now))
            .filter(workflow_run::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Flags a non-terminal run for termination.
    ///
    /// Returns `false` when the run is already terminal. A second request
    /// keeps the first reason.
    pub async fn request_termination(&self, id: Uuid, reason: &str) -> Result<bool, EngineError> {
        let run = self.require(id).await?;
        if parse_status(&run)?.is_terminal() {
            return Ok(false);
        }
        if run.terminate_requested {
            return Ok(true);
        }

        let result = WorkflowRun::update_many()
            .col_expr(workflow_run::Column::TerminateRequested, Expr::value(true))
            .col_expr(
                workflow_run::Column::TerminateReason,
                Expr::value(Some(reason.to_string())),
            )
            .col_expr(
                workflow_run::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(workflow_run::Column::Id.eq(id))
            .filter(workflow_run::Column::Status.is_in(active_statuses()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Termination reason if one was requested.
    pub async fn termination_request(&self, id: Uuid) -> Result<Option<String>, EngineError> {
        let row: Option<(bool, Option<String>)> = WorkflowRun::find_by_id(id)
            .select_only()
            .column(workflow_run::Column::TerminateRequested)
            .column(workflow_run::Column::TerminateReason)
            .into_tuple()
            .one(&self.db)
            .await?;

        Ok(match row {
            Some((true, reason)) => {
                Some(reason.unwrap_or_else(|| "Termination requested".to_string()))
            }
            _ => None,
        })
    }

    /// Pending and Running runs, oldest first.
    pub async fn list_active(&self) -> Result<Vec<workflow_run::Model>, EngineError> {
        Ok(WorkflowRun::find()
            .filter(workflow_run::Column::Status.is_in(active_statuses()))
            .order_by_asc(workflow_run::Column::CreatedAt)
            .order_by_asc(workflow_run::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Non-terminal runs started by `parent_id`.
    pub async fn active_children(&self, parent_id: Uuid) -> Result<Vec<workflow_run::Model>, EngineError> {
        Ok(WorkflowRun::find()
            .filter(workflow_run::Column::ParentRunId.eq(parent_id))
            .filter(workflow_run::Column::Status.is_in(active_statuses()))
            .all(&self.db)
            .await?)
    }

    /// Runs ordered by `created_at DESC, id DESC`, resuming after `query.after`.
    pub async fn list(&self, query: &RunQuery) -> Result<Vec<workflow_run::Model>, EngineError> {
        let mut select = WorkflowRun::find();

        if !query.statuses.is_empty() {
            select = select.filter(
                workflow_run::Column::Status
                    .is_in(query.statuses.iter().map(|status| status.as_str())),
            );
        }

        if let Some(cursor) = query.after {
            select = select.filter(
                Condition::any()
                    .add(workflow_run::Column::CreatedAt.lt(cursor.created_at))
                    .add(
                        Condition::all()
                            .add(workflow_run::Column::CreatedAt.eq(cursor.created_at))
                            .add(workflow_run::Column::Id.lt(cursor.id)),
                    ),
            );
        }

        Ok(select
            .order_by_desc(workflow_run::Column::CreatedAt)
            .order_by_desc(workflow_run::Column::Id)
            .limit(query.limit)
            .all(&self.db)
            .await?)
    }
}

fn active_statuses() -> [&'static str; 2] {
    [RunStatus::Pending.as_str(), RunStatus::Running.as_str()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Terminated,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>(), Ok(status));
        }
        assert!("paused".parse::<RunStatus>().is_err());
    }

    #[test]
    fn only_final_states_are_terminal() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Terminated.is_terminal());
    }
}
