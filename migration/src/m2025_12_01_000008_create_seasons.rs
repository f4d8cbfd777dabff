//! Migration to create the seasons table.
//!
//! Seasons are keyed by `(show_id, external_id)`. The `(show_id, number)` index
//! backs episode-to-season resolution.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Seasons::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Seasons::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Seasons::ExternalId).big_integer().not_null())
                    .col(ColumnDef::new(Seasons::ShowId).integer().not_null())
                    .col(ColumnDef::new(Seasons::Url).text().null())
                    .col(ColumnDef::new(Seasons::Number).integer().null())
                    .col(ColumnDef::new(Seasons::Name).text().null())
                    .col(ColumnDef::new(Seasons::EpisodeOrder).integer().null())
                    .col(ColumnDef::new(Seasons::PremiereDate).date().null())
                    .col(ColumnDef::new(Seasons::EndDate).date().null())
                    .col(ColumnDef::new(Seasons::NetworkId).integer().null())
                    .col(ColumnDef::new(Seasons::ImageMedium).text().null())
                    .col(ColumnDef::new(Seasons::ImageOriginal).text().null())
                    .col(ColumnDef::new(Seasons::Summary).text().null())
                    .col(
                        ColumnDef::new(Seasons::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_seasons_show_id")
                            .from(Seasons::Table, Seasons::ShowId)
                            .to(Shows::Table, Shows::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_seasons_network_id")
                            .from(Seasons::Table, Seasons::NetworkId)
                            .to(Networks::Table, Networks::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_seasons_show_external")
                    .table(Seasons::Table)
                    .col(Seasons::ShowId)
                    .col(Seasons::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_seasons_show_number")
                    .table(Seasons::Table)
                    .col(Seasons::ShowId)
                    .col(Seasons::Number)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_seasons_show_number").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("uq_seasons_show_external").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Seasons::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Seasons {
    Table,
    Id,
    ExternalId,
    ShowId,
    Url,
    Number,
    Name,
    EpisodeOrder,
    PremiereDate,
    EndDate,
    NetworkId,
    ImageMedium,
    ImageOriginal,
    Summary,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Shows {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Networks {
    Table,
    Id,
}
