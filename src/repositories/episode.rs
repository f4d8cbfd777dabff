//! Episode repository
//!
//! Episodes are keyed by `(show_id, external_id)`; the season link is resolved
//! by the caller before the upsert.

use chrono::Utc;
use sea_orm::prelude::{Date, DateTimeWithTimeZone, Time};
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    QueryFilter, Set,
};

use crate::models::episode::{self, Entity as Episode};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeFields {
    pub external_id: i64,
    pub show_id: i32,
    pub season_id: Option<i32>,
    pub url: Option<String>,
    pub name: Option<String>,
    pub season_number: Option<i32>,
    pub number: Option<i32>,
    pub episode_type: Option<String>,
    pub airdate: Option<Date>,
    pub airtime: Option<Time>,
    pub airstamp: Option<DateTimeWithTimeZone>,
    pub runtime: Option<i32>,
    pub rating_average: Option<f64>,
    pub image_medium: Option<String>,
    pub image_original: Option<String>,
    pub summary: Option<String>,
}

impl EpisodeFields {
    fn apply(self, active: &mut episode::ActiveModel) {
        active.external_id = Set(self.external_id);
        active.show_id = Set(self.show_id);
        active.season_id = Set(self.season_id);
        active.url = Set(self.url);
        active.name = Set(self.name);
        active.season_number = Set(self.season_number);
        active.number = Set(self.number);
        active.episode_type = Set(self.episode_type);
        active.airdate = Set(self.airdate);
        active.airtime = Set(self.airtime);
        active.airstamp = Set(self.airstamp);
        active.runtime = Set(self.runtime);
        active.rating_average = Set(self.rating_average);
        active.image_medium = Set(self.image_medium);
        active.image_original = Set(self.image_original);
        active.summary = Set(self.summary);
        active.updated_at = Set(Utc::now().fixed_offset());
    }
}

pub struct EpisodeRepository<'a, C> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> EpisodeRepository<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn find(&self, show_id: i32, external_id: i64) -> Result<Option<episode::Model>, DbErr> {
        Episode::find()
            .filter(episode::Column::ShowId.eq(show_id))
            .filter(episode::Column::ExternalId.eq(external_id))
            .one(self.conn)
            .await
    }

    /// Inserts or overwrites the episode and returns its internal id.
    pub async fn upsert(&self, fields: EpisodeFields) -> Result<i32, DbErr> {
        match self.find(fields.show_id, fields.external_id).await? {
            Some(existing) => {
                let id = existing.id;
                let mut active: episode::ActiveModel = existing.into();
                fields.apply(&mut active);
                active.update(self.conn).await?;
                Ok(id)
            }
            None => {
                let mut active = episode::ActiveModel::new();
                fields.apply(&mut active);
                let inserted = Episode::insert(active).exec(self.conn).await?;
                Ok(inserted.last_insert_id)
            }
        }
    }
}
