//! Migration to create the networks table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Networks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Networks::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Networks::ExternalId).big_integer().not_null())
                    .col(ColumnDef::new(Networks::Name).text().null())
                    .col(ColumnDef::new(Networks::CountryName).text().null())
                    .col(ColumnDef::new(Networks::CountryCode).text().null())
                    .col(ColumnDef::new(Networks::CountryTimezone).text().null())
                    .col(ColumnDef::new(Networks::OfficialSite).text().null())
                    .col(
                        ColumnDef::new(Networks::UpdatedAt)
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
                    .name("uq_networks_external_id")
                    .table(Networks::Table)
                    .col(Networks::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("uq_networks_external_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Networks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Networks {
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
