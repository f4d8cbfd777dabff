//! Migration to create the shows table.
//!
//! Shows reference at most one network and one web channel. Both references
//! are cleared rather than cascaded if the outlet row is ever removed.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Shows::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Shows::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Shows::ExternalId).big_integer().not_null())
                    .col(ColumnDef::new(Shows::Url).text().null())
                    .col(ColumnDef::new(Shows::Name).text().not_null())
                    .col(ColumnDef::new(Shows::ShowType).text().null())
                    .col(ColumnDef::new(Shows::Language).text().null())
                    .col(ColumnDef::new(Shows::Status).text().null())
                    .col(ColumnDef::new(Shows::Runtime).integer().null())
                    .col(ColumnDef::new(Shows::AverageRuntime).integer().null())
                    .col(ColumnDef::new(Shows::Premiered).date().null())
                    .col(ColumnDef::new(Shows::Ended).date().null())
                    .col(ColumnDef::new(Shows::OfficialSite).text().null())
                    .col(ColumnDef::new(Shows::ScheduleTime).time().null())
                    .col(ColumnDef::new(Shows::ScheduleDays).text().null())
                    .col(ColumnDef::new(Shows::RatingAverage).double().null())
                    .col(ColumnDef::new(Shows::Weight).integer().null())
                    .col(ColumnDef::new(Shows::NetworkId).integer().null())
                    .col(ColumnDef::new(Shows::WebChannelId).integer().null())
                    .col(ColumnDef::new(Shows::ExternalsTvrage).big_integer().null())
                    .col(ColumnDef::new(Shows::ExternalsThetvdb).big_integer().null())
                    .col(ColumnDef::new(Shows::ExternalsImdb).text().null())
                    .col(ColumnDef::new(Shows::ImageMedium).text().null())
                    .col(ColumnDef::new(Shows::ImageOriginal).text().null())
                    .col(ColumnDef::new(Shows::Summary).text().null())
                    .col(ColumnDef::new(Shows::UpstreamUpdated).big_integer().null())
                    .col(
                        ColumnDef::new(Shows::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_shows_network_id")
                            .from(Shows::Table, Shows::NetworkId)
                            .to(Networks::Table, Networks::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_shows_web_channel_id")
                            .from(Shows::Table, Shows::WebChannelId)
                            .to(WebChannels::Table, WebChannels::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_shows_external_id")
                    .table(Shows::Table)
                    .col(Shows::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("uq_shows_external_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Shows::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Shows {
    Table,
    Id,
    ExternalId,
    Url,
    Name,
    ShowType,
    Language,
    Status,
    Runtime,
    AverageRuntime,
    Premiered,
    Ended,
    OfficialSite,
    ScheduleTime,
    ScheduleDays,
    RatingAverage,
    Weight,
    NetworkId,
    WebChannelId,
    ExternalsTvrage,
    ExternalsThetvdb,
    ExternalsImdb,
    ImageMedium,
    ImageOriginal,
    Summary,
    UpstreamUpdated,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Networks {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum WebChannels {
    Table,
    Id,
}
