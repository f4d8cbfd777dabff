//! Migration to create the show_genres association table.
//!
//! The composite primary key keeps the association a set.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ShowGenres::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ShowGenres::ShowId).integer().not_null())
                    .col(ColumnDef::new(ShowGenres::GenreId).integer().not_null())
                    .primary_key(
                        Index::create()
                            .col(ShowGenres::ShowId)
                            .col(ShowGenres::GenreId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_show_genres_show_id")
                            .from(ShowGenres::Table, ShowGenres::ShowId)
                            .to(Shows::Table, Shows::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_show_genres_genre_id")
                            .from(ShowGenres::Table, ShowGenres::GenreId)
                            .to(Genres::Table, Genres::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ShowGenres::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ShowGenres {
    Table,
    ShowId,
    GenreId,
}

#[derive(DeriveIden)]
enum Shows {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Genres {
    Table,
    Id,
}
