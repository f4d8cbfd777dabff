//! Migration to create the web_channels table.
//!
//! Streaming outlets share the network shape but live in their own table
//! because upstream numbers them independently.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WebChannels::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WebChannels::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(WebChannels::ExternalId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WebChannels::Name).text().null())
                    .col(ColumnDef::new(WebChannels::CountryName).text().null())
                    .col(ColumnDef::new(WebChannels::CountryCode).text().null())
                    .col(ColumnDef::new(WebChannels::CountryTimezone).text().null())
                    .col(ColumnDef::new(WebChannels::OfficialSite).text().null())
                    .col(
                        ColumnDef::new(WebChannels::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_web_channels_external_id")
                    .table(WebChannels::Table)
                    .col(WebChannels::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("uq_web_channels_external_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(WebChannels::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WebChannels {
    Table,
    Id,
    ExternalId,
    Name,
    CountryName,
    CountryCode,
    CountryTimezone,
    OfficialSite,
    UpdatedAt,
}
