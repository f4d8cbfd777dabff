//! Migration to create the workflow_runs table.
//!
//! Each row is one durable execution of a workflow definition. Rows are kept
//! after they reach a terminal status so they can be inspected later.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WorkflowRuns::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WorkflowRuns::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WorkflowRuns::Definition).text().not_null())
                    .col(ColumnDef::new(WorkflowRuns::Input).json_binary().not_null())
                    .col(
                        ColumnDef::new(WorkflowRuns::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(WorkflowRuns::CustomStatus).text().null())
                    .col(ColumnDef::new(WorkflowRuns::Result).json_binary().null())
                    .col(ColumnDef::new(WorkflowRuns::Error).text().null())
                    .col(
                        ColumnDef::new(WorkflowRuns::TerminateRequested)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(WorkflowRuns::TerminateReason).text().null())
                    .col(ColumnDef::new(WorkflowRuns::ParentRunId).uuid().null())
                    .col(
                        ColumnDef::new(WorkflowRuns::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(WorkflowRuns::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(WorkflowRuns::FinishedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(WorkflowRuns::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Admin listing and startup recovery both filter by status
        manager
            .create_index(
                Index::create()
                    .name("idx_workflow_runs_status_created")
                    .table(WorkflowRuns::Table)
                    .col(WorkflowRuns::Status)
                    .col(WorkflowRuns::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_workflow_runs_status_created")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(WorkflowRuns::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WorkflowRuns {
    Table,
    Id,
    Definition,
    Input,
    Status,
    CustomStatus,
    Result,
    Error,
    TerminateRequested,
    TerminateReason,
    ParentRunId,
    CreatedAt,
    StartedAt,
    FinishedAt,
    UpdatedAt,
}
