//! Migration to create the episodes table.
//!
//! `season_id` is nullable for specials; ingestion never writes a season number
//! that failed to resolve.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Episodes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Episodes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Episodes::ExternalId).big_integer().not_null())
                    .col(ColumnDef::new(Episodes::ShowId).integer().not_null())
                    .col(ColumnDef::new(Episodes::SeasonId).integer().null())
                    .col(ColumnDef::new(Episodes::Url).text().null())
                    .col(ColumnDef::new(Episodes::Name).text().null())
                    .col(ColumnDef::new(Episodes::SeasonNumber).integer().null())
                    .col(ColumnDef::new(Episodes::Number).integer().null())
                    .col(ColumnDef::new(Episodes::EpisodeType).text().null())
                    .col(ColumnDef::new(Episodes::Airdate).date().null())
                    .col(ColumnDef::new(Episodes::Airtime).time().null())
                    .col(
                        ColumnDef::new(Episodes::Airstamp)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Episodes::Runtime).integer().null())
                    .col(ColumnDef::new(Episodes::RatingAverage).double().null())
                    .col(ColumnDef::new(Episodes::ImageMedium).text().null())
                    .col(ColumnDef::new(Episodes::ImageOriginal).text().null())
                    .col(ColumnDef::new(Episodes::Summary).text().null())
                    .col(
                        ColumnDef::new(Episodes::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_episodes_show_id")
                            .from(Episodes::Table, Episodes::ShowId)
                            .to(Shows::Table, Shows::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_episodes_season_id")
                            .from(Episodes::Table, Episodes::SeasonId)
                            .to(Seasons::Table, Seasons::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_episodes_show_external")
                    .table(Episodes::Table)
                    .col(Episodes::ShowId)
                    .col(Episodes::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_episodes_season_id")
                    .table(Episodes::Table)
                    .col(Episodes::SeasonId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_episodes_season_id").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("uq_episodes_show_external").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Episodes::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Episodes {
    Table,
    Id,
    ExternalId,
    ShowId,
    SeasonId,
    Url,
    Name,
    SeasonNumber,
    Number,
    EpisodeType,
    Airdate,
    Airtime,
    Airstamp,
    Runtime,
    RatingAverage,
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
enum Seasons {
    Table,
    Id,
}
