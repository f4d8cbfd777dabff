//! Genre repository and the show/genre link set.

use std::collections::BTreeSet;

use sea_orm::{
    ActiveModelBehavior, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
};

use crate::models::genre::{self, Entity as Genre};
use crate::models::show_genre::{self, Entity as ShowGenre};

/// Link rows touched by [`GenreRepository::sync_show_genres`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenreLinkChanges {
    pub linked: usize,
    pub unlinked: usize,
}

pub struct GenreRepository<'a, C> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> GenreRepository<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<genre::Model>, DbErr> {
        Genre::find()
            .filter(genre::Column::Name.eq(name))
            .one(self.conn)
            .await
    }

    /// Returns the id of the named genre, creating it when absent.
    pub async fn get_or_create(&self, name: &str) -> Result<i32, DbErr> {
        if let Some(existing) = self.find_by_name(name).await? {
            return Ok(existing.id);
        }

        let mut active = genre::ActiveModel::new();
        active.name = Set(name.to_string());
        let inserted = Genre::insert(active).exec(self.conn).await?;
        Ok(inserted.last_insert_id)
    }

    /// Genre ids currently linked to the show.
    pub async fn genre_ids_for_show(&self, show_id: i32) -> Result<BTreeSet<i32>, DbErr> {
        let links = ShowGenre::find()
            .filter(show_genre::Column::ShowId.eq(show_id))
            .all(self.conn)
            .await?;
        Ok(links.into_iter().map(|link| link.genre_id).collect())
    }

    /// Makes the show's genre links equal to `names`.
    ///
    /// Missing genres are created, missing links added and links to genres no
    /// longer named removed. Names must already be trimmed and non-empty.
    pub async fn sync_show_genres(&self, show_id: i32, names: &[String]) -> Result<GenreLinkChanges, DbErr> {
        let mut wanted = BTreeSet::new();
        for name in names {
            wanted.insert(self.get_or_create(name).await?);
        }
        let current = self.genre_ids_for_show(show_id).await?;

        let missing: Vec<i32> = wanted.difference(&current).copied().collect();
        let stale: Vec<i32> = current.difference(&wanted).copied().collect();

        if !missing.is_empty() {
            let links = missing.iter().map(|&genre_id| show_genre::ActiveModel {
                show_id: Set(show_id),
                genre_id: Set(genre_id),
            });
            ShowGenre::insert_many(links)
                .exec_without_returning(self.conn)
                .await?;
        }

        if !stale.is_empty() {
            ShowGenre::delete_many()
                .filter(show_genre::Column::ShowId.eq(show_id))
                .filter(show_genre::Column::GenreId.is_in(stale.clone()))
                .exec(self.conn)
                .await?;
        }

        Ok(GenreLinkChanges {
            linked: missing.len(),
            unlinked: stale.len(),
        })
    }
}
