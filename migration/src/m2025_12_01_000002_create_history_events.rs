//! Migration to create the history_events table.
//!
//! The per-run event log is append-only. `(run_id, sequence)` is both the
//! primary key and the replay order.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(HistoryEvents::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(HistoryEvents::RunId).uuid().not_null())
                    .col(
                        ColumnDef::new(HistoryEvents::Sequence)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(HistoryEvents::Kind).text().not_null())
                    .col(
                        ColumnDef::new(HistoryEvents::Payload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(HistoryEvents::RecordedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(HistoryEvents::RunId)
                            .col(HistoryEvents::Sequence),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_history_events_run_id")
                            .from(HistoryEvents::Table, HistoryEvents::RunId)
                            .to(WorkflowRuns::Table, WorkflowRuns::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(HistoryEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum HistoryEvents {
    Table,
    RunId,
    Sequence,
    Kind,
    Payload,
    RecordedAt,
}

#[derive(DeriveIden)]
enum WorkflowRuns {
    Table,
    Id,
}
