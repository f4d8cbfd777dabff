//! Network repository
//!
//! Broadcast networks keyed by upstream id. [`OutletFields`] is shared with
//! the web channel repository since both tables carry the same columns.

use chrono::Utc;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    QueryFilter, Set,
};

use crate::models::network::{self, Entity as Network};

/// Mapped columns of a network or web channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutletFields {
    pub external_id: i64,
    pub name: Option<String>,
    pub country_name: Option<String>,
    pub country_code: Option<String>,
    pub country_timezone: Option<String>,
    pub official_site: Option<String>,
}

impl OutletFields {
    fn apply(self, active: &mut network::ActiveModel) {
        active.external_id = Set(self.external_id);
        active.name = Set(self.name);
        active.country_name = Set(self.country_name);
        active.country_code = Set(self.country_code);
        active.country_timezone = Set(self.country_timezone);
        active.official_site = Set(self.official_site);
        active.updated_at = Set(Utc::now().fixed_offset());
    }
}

/// Repository for network rows
pub struct NetworkRepository<'a, C> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> NetworkRepository<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn find_by_external_id(&self, external_id: i64) -> Result<Option<network::Model>, DbErr> {
        Network::find()
            .filter(network::Column::ExternalId.eq(external_id))
            .one(self.conn)
            .await
    }

    /// Inserts or overwrites the network and returns its internal id.
    pub async fn upsert(&self, fields: OutletFields) -> Result<i32, DbErr> {
        match self.find_by_external_id(fields.external_id).await? {
            Some(existing) => {
                let id = existing.id;
                let mut active: network::ActiveModel = existing.into();
                fields.apply(&mut active);
                active.update(self.conn).await?;
                Ok(id)
            }
            None => {
                let mut active = network::ActiveModel::new();
                fields.apply(&mut active);
                let inserted = Network::insert(active).exec(self.conn).await?;
                Ok(inserted.last_insert_id)
            }
        }
    }
}
