//! Show repository
//!
//! Shows are the root of the catalog graph and are keyed by upstream id alone.

use chrono::Utc;
use sea_orm::prelude::{Date, Time};
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    QueryFilter, Set,
};

use crate::models::show::{self, Entity as Show};

/// Mapped columns of a show, with outlets already resolved to internal ids
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShowFields {
    pub external_id: i64,
    pub url: Option<String>,
    pub name: String,
    pub show_type: Option<String>,
    pub language: Option<String>,
    pub status: Option<String>,
    pub runtime: Option<i32>,
    pub average_runtime: Option<i32>,
    pub premiered: Option<Date>,
    pub ended: Option<Date>,
    pub official_site: Option<String>,
    pub schedule_time: Option<Time>,
    pub schedule_days: Option<String>,
    pub rating_average: Option<f64>,
    pub weight: Option<i32>,
    pub network_id: Option<i32>,
    pub web_channel_id: Option<i32>,
    pub externals_tvrage: Option<i64>,
    pub externals_thetvdb: Option<i64>,
    pub externals_imdb: Option<String>,
    pub image_medium: Option<String>,
    pub image_original: Option<String>,
    pub summary: Option<String>,
    pub upstream_updated: Option<i64>,
}

impl ShowFields {
    fn apply(self, active: &mut show::ActiveModel) {
        active.external_id = Set(self.external_id);
        active.url = Set(self.url);
        active.name = Set(self.name);
        active.show_type = Set(self.show_type);
        active.language = Set(self.language);
        active.status = Set(self.status);
        active.runtime = Set(self.runtime);
        active.average_runtime = Set(self.average_runtime);
        active.premiered = Set(self.premiered);
        active.ended = Set(self.ended);
        active.official_site = Set(self.official_site);
        active.schedule_time = Set(self.schedule_time);
        active.schedule_days = Set(self.schedule_days);
        active.rating_average = Set(self.rating_average);
        active.weight = Set(self.weight);
        active.network_id = Set(self.network_id);
        active.web_channel_id = Set(self.web_channel_id);
        active.externals_tvrage = Set(self.externals_tvrage);
        active.externals_thetvdb = Set(self.externals_thetvdb);
        active.externals_imdb = Set(self.externals_imdb);
        active.image_medium = Set(self.image_medium);
        active.image_original = Set(self.image_original);
        active.summary = Set(self.summary);
        active.upstream_updated = Set(self.upstream_updated);
        active.updated_at = Set(Utc::now().fixed_offset());
    }
}

/// Repository for show rows
pub struct ShowRepository<'a, C> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> ShowRepository<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn find_by_external_id(&self, external_id: i64) -> Result<Option<show::Model>, DbErr> {
        Show::find()
            .filter(show::Column::ExternalId.eq(external_id))
            .one(self.conn)
            .await
    }

    /// Inserts or overwrites the show and returns its internal id.
    ///
    /// An existing row keeps its id; every mapped column is replaced, so a
    /// field that upstream dropped becomes absent here too.
    pub async fn upsert(&self, fields: ShowFields) -> Result<i32, DbErr> {
        match self.find_by_external_id(fields.external_id).await? {
            Some(existing) => {
                let id = existing.id;
                let mut active: show::ActiveModel = existing.into();
                fields.apply(&mut active);
                active.update(self.conn).await?;
                Ok(id)
            }
            None => {
                let mut active = show::ActiveModel::new();
                fields.apply(&mut active);
                let inserted = Show::insert(active).exec(self.conn).await?;
                Ok(inserted.last_insert_id)
            }
        }
    }
}
