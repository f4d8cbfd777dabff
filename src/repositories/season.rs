//! Season repository
//!
//! Seasons are keyed by `(show_id, external_id)`.

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::prelude::Date;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    QueryFilter, Set,
};

use crate::models::season::{self, Entity as Season};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeasonFields {
    pub external_id: i64,
    pub show_id: i32,
    pub url: Option<String>,
    pub number: Option<i32>,
    pub name: Option<String>,
    pub episode_order: Option<i32>,
    pub premiere_date: Option<Date>,
    pub end_date: Option<Date>,
    pub network_id: Option<i32>,
    pub image_medium: Option<String>,
    pub image_original: Option<String>,
    pub summary: Option<String>,
}

impl SeasonFields {
    fn apply(self, active: &mut season::ActiveModel) {
        active.external_id = Set(self.external_id);
        active.show_id = Set(self.show_id);
        active.url = Set(self.url);
        active.number = Set(self.number);
        active.name = Set(self.name);
        active.episode_order = Set(self.episode_order);
        active.premiere_date = Set(self.premiere_date);
        active.end_date = Set(self.end_date);
        active.network_id = Set(self.network_id);
        active.image_medium = Set(self.image_medium);
        active.image_original = Set(self.image_original);
        active.summary = Set(self.summary);
        active.updated_at = Set(Utc::now().fixed_offset());
    }
}

pub struct SeasonRepository<'a, C> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> SeasonRepository<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn find(&self, show_id: i32, external_id: i64) -> Result<Option<season::Model>, DbErr> {
        Season::find()
            .filter(season::Column::ShowId.eq(show_id))
            .filter(season::Column::ExternalId.eq(external_id))
            .one(self.conn)
            .await
    }

    /// Inserts or overwrites the season and returns its internal id.
    pub async fn upsert(&self, fields: SeasonFields) -> Result<i32, DbErr> {
        match self.find(fields.show_id, fields.external_id).await? {
            Some(existing) => {
                let id = existing.id;
                let mut active: season::ActiveModel = existing.into();
                fields.apply(&mut active);
                active.update(self.conn).await?;
                Ok(id)
            }
            None => {
                let mut active = season::ActiveModel::new();
                fields.apply(&mut active);
                let inserted = Season::insert(active).exec(self.conn).await?;
                Ok(inserted.last_insert_id)
            }
        }
    }

    /// Season number to internal id for one show. Seasons without a number
    /// are left out.
    pub async fn numbers_for_show(&self, show_id: i32) -> Result<HashMap<i32, i32>, DbErr> {
        let seasons = Season::find()
            .filter(season::Column::ShowId.eq(show_id))
            .all(self.conn)
            .await?;
        Ok(seasons
            .into_iter()
            .filter_map(|season| season.number.map(|number| (number, season.id)))
            .collect())
    }
}
