//! WorkflowRun entity model
//!
//! This module contains the SeaORM entity model for the workflow_runs table,
//! one row per durable execution of a workflow definition.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Durable run record owned by the workflow engine
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "workflow_runs")]
pub struct Model {
    /// Run identifier handed back to callers as the status handle
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Registered workflow definition name (e.g., show_ingest, show_update)
    pub definition: String,

    /// Input payload the run was started with; replay always starts from it
    #[sea_orm(column_type = "JsonBinary")]
    pub input: JsonValue,

    /// Lifecycle status (pending, running, completed, failed, terminated)
    pub status: String,

    /// Free-text progress set by the workflow for pollers
    pub custom_status: Option<String>,

    /// Final result payload once the run completed
    #[sea_orm(column_type = "JsonBinary")]
    pub result: Option<JsonValue>,

    /// Failure description for failed or terminated runs
    pub error: Option<String>,

    /// Set by an external termination request; observed at the next suspension point
    pub terminate_requested: bool,

    /// Reason supplied with the termination request
    pub terminate_reason: Option<String>,

    /// Parent run when this run was started as a sub-run
    pub parent_run_id: Option<Uuid>,

    /// Timestamp when the run was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the engine first picked the run up
    pub started_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the run reached a terminal status
    pub finished_at: Option<DateTimeWithTimeZone>,

    /// Timestamp of the last status or progress change
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::history_event::Entity")]
    HistoryEvent,
}

impl Related<super::history_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::HistoryEvent.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
