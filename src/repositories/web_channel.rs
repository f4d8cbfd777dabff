//! Web channel repository

use chrono::Utc;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    QueryFilter, Set,
};

use super::network::OutletFields;
use crate::models::web_channel::{self, Entity as WebChannel};

fn apply(fields: OutletFields, active: &mut web_channel::ActiveModel) {
    active.external_id = Set(fields.external_id);
    active.name = Set(fields.name);
    active.country_name = Set(fields.country_name);
    active.country_code = Set(fields.country_code);
    active.country_timezone = Set(fields.country_timezone);
    active.official_site = Set(fields.official_site);
    active.updated_at = Set(Utc::now().fixed_offset());
}

/// Repository for streaming outlets
pub struct WebChannelRepository<'a, C> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> WebChannelRepository<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn find_by_external_id(
        &self,
        external_id: i64,
    ) -> Result<Option<web_channel::Model>, DbErr> {
        WebChannel::find()
            .filter(web_channel::Column::ExternalId.eq(external_id))
            .one(self.conn)
            .await
    }

    /// Inserts or overwrites the web channel and returns its internal id.
    pub async fn upsert(&self, fields: OutletFields) -> Result<i32, DbErr> {
        match self.find_by_external_id(fields.external_id).await? {
            Some(existing) => {
                let id = existing.id;
                let mut active: web_channel::ActiveModel = existing.into();
                apply(fields, &mut active);
                active.update(self.conn).await?;
                Ok(id)
            }
            None => {
                let mut active = web_channel::ActiveModel::new();
                apply(fields, &mut active);
                let inserted = WebChannel::insert(active).exec(self.conn).await?;
                Ok(inserted.last_insert_id)
            }
        }
    }
}
